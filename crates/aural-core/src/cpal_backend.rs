//! CPAL engine implementation
//!
//! Streams are built in byte (raw) mode at the stream's fixed sample format,
//! so the trampoline always sees native interleaved memory regardless of
//! format. Topologies:
//!
//! - **Output-only**: one output stream; the trampoline runs in its data
//!   callback.
//! - **Input-only**: one input stream; the trampoline runs there with an
//!   empty output buffer.
//! - **Duplex**: cpal has no duplex streams, so the capture callback pushes
//!   raw bytes into a lock-free SPSC ring buffer and the playback callback
//!   pops them before invoking the trampoline. The ring only ever holds
//!   whole frames, so channel alignment survives overflow and underrun; on
//!   underrun the missing input is silenced and the callback sees the
//!   input-underflow flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleRate, StreamConfig};

use crate::device::{self, DeviceInfo, Direction, HostApiInfo};
use crate::marshal;
use crate::engine::{Engine, EngineStream};
use crate::error::{AudioError, AudioResult};
use crate::trampoline::{SharedStreamState, Trampoline};
use crate::types::{
    StatusFlags, StreamInfo, StreamParams, TimeInfo, MAX_FRAMES_PER_BUFFER,
};

/// The production audio engine, backed by cpal
///
/// Constructing one is initialization, dropping it is termination;
/// overlapping instances are fine. cpal needs no global setup, so both are
/// cheap.
pub struct CpalEngine;

impl CpalEngine {
    pub fn new() -> AudioResult<Self> {
        log::debug!(
            "cpal engine initialized (default host: {:?})",
            cpal::default_host().id()
        );
        Ok(Self)
    }
}

impl Engine for CpalEngine {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn version_text(&self) -> String {
        format!("aural-core {} (cpal backend)", env!("CARGO_PKG_VERSION"))
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        trampoline: Trampoline,
    ) -> AudioResult<Box<dyn EngineStream>> {
        let sample_format = params
            .sample_format
            .to_cpal()
            .ok_or(AudioError::UnsupportedFormat(params.sample_format))?;

        let shared = trampoline.shared().clone();
        let clock = Instant::now();
        let format = params.sample_format;
        let rate = params.sample_rate;
        let frames = params.frames_per_buffer;
        let sample_size = params.sample_format.size_in_bytes();
        let in_frame_bytes = params.input_channels as usize * sample_size;
        let out_frame_bytes = params.output_channels as usize * sample_size;
        let buffer_period = frames as f64 / rate as f64;

        let has_input = params.input_channels > 0;
        let has_output = params.output_channels > 0;
        let input_latency = if has_input { buffer_period } else { 0.0 };
        let output_latency = if has_output { buffer_period } else { 0.0 };

        let mut input_stream = None;
        let output_stream;

        if has_output {
            // Duplex capture side: raw bytes flow to the playback callback
            // through a lock-free ring buffer, sized 4x a buffer to absorb
            // timing jitter between the two streams.
            let mut consumer = None;
            if has_input {
                let capacity = frames as usize * in_frame_bytes * 4;
                let (mut producer, c) = rtrb::RingBuffer::<u8>::new(capacity);
                consumer = Some(c);
                log::debug!(
                    "Duplex capture ring buffer created with capacity {} bytes",
                    capacity
                );

                let input_device = resolve_input_device(params)?;
                let in_config = StreamConfig {
                    channels: params.input_channels,
                    sample_rate: SampleRate(rate),
                    buffer_size: CpalBufferSize::Fixed(frames),
                };
                let stream = input_device
                    .build_input_stream_raw(
                        &in_config,
                        sample_format,
                        move |data: &cpal::Data, _info: &cpal::InputCallbackInfo| {
                            push_frames(&mut producer, data.bytes(), in_frame_bytes);
                        },
                        move |err| {
                            log::error!("Input stream error: {}", err);
                        },
                        None,
                    )
                    .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
                input_stream = Some(stream);
            }

            let output_device = resolve_output_device(params)?;
            let out_config = StreamConfig {
                channels: params.output_channels,
                sample_rate: SampleRate(rate),
                buffer_size: CpalBufferSize::Fixed(frames),
            };

            let mut trampoline = trampoline;
            let mut input_scratch =
                vec![0u8; if has_input { MAX_FRAMES_PER_BUFFER * in_frame_bytes } else { 0 }];
            let shared_cb = shared.clone();
            let stream = output_device
                .build_output_stream_raw(
                    &out_config,
                    sample_format,
                    move |data: &mut cpal::Data, info: &cpal::OutputCallbackInfo| {
                        let started_at = Instant::now();
                        let bytes = data.bytes_mut();
                        // A fixed buffer size is a request, not a guarantee;
                        // some hosts deliver larger blocks. Process at most
                        // what the marshal buffers pre-allocate for and
                        // silence the remainder.
                        let frame_count =
                            (bytes.len() / out_frame_bytes).min(MAX_FRAMES_PER_BUFFER);
                        let out_len = frame_count * out_frame_bytes;
                        if bytes.len() > out_len {
                            marshal::fill_silence(format, &mut bytes[out_len..]);
                        }

                        let current = clock.elapsed().as_secs_f64();
                        let ts = info.timestamp();
                        let dac_delta = ts
                            .playback
                            .duration_since(&ts.callback)
                            .map(|d| d.as_secs_f64())
                            .unwrap_or(buffer_period);

                        let needed = frame_count * in_frame_bytes;
                        let mut flags = StatusFlags::default();
                        if let Some(consumer) = consumer.as_mut() {
                            if fill_from_ring(
                                consumer,
                                &mut input_scratch[..needed],
                                in_frame_bytes,
                            ) {
                                flags.input_underflow = true;
                            }
                        }

                        let time = TimeInfo {
                            input_adc_time: if has_input { current - input_latency } else { 0.0 },
                            current_time: current,
                            output_dac_time: current + dac_delta,
                        };
                        let _ = trampoline.process(
                            &input_scratch[..needed],
                            &mut bytes[..out_len],
                            frame_count,
                            time,
                            flags,
                        );

                        if frame_count > 0 {
                            let budget = frame_count as f64 / rate as f64;
                            shared_cb.record_cpu_load(
                                started_at.elapsed().as_secs_f64() / budget,
                            );
                        }
                    },
                    move |err| {
                        log::error!("Output stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
            output_stream = Some(stream);
        } else {
            // Input-only: the trampoline runs on the capture callback with
            // an empty output buffer.
            let input_device = resolve_input_device(params)?;
            let in_config = StreamConfig {
                channels: params.input_channels,
                sample_rate: SampleRate(rate),
                buffer_size: CpalBufferSize::Fixed(frames),
            };
            let mut trampoline = trampoline;
            let shared_cb = shared.clone();
            let stream = input_device
                .build_input_stream_raw(
                    &in_config,
                    sample_format,
                    move |data: &cpal::Data, info: &cpal::InputCallbackInfo| {
                        let started_at = Instant::now();
                        let bytes = data.bytes();
                        // Oversize blocks are truncated to the marshal
                        // buffers' capacity, same as on the output path.
                        let frame_count =
                            (bytes.len() / in_frame_bytes).min(MAX_FRAMES_PER_BUFFER);

                        let current = clock.elapsed().as_secs_f64();
                        let ts = info.timestamp();
                        let adc_delta = ts
                            .callback
                            .duration_since(&ts.capture)
                            .map(|d| d.as_secs_f64())
                            .unwrap_or(buffer_period);

                        let time = TimeInfo {
                            input_adc_time: current - adc_delta,
                            current_time: current,
                            output_dac_time: 0.0,
                        };
                        let _ = trampoline.process(
                            &bytes[..frame_count * in_frame_bytes],
                            &mut [],
                            frame_count,
                            time,
                            StatusFlags::default(),
                        );

                        if frame_count > 0 {
                            let budget = frame_count as f64 / rate as f64;
                            shared_cb.record_cpu_load(
                                started_at.elapsed().as_secs_f64() / budget,
                            );
                        }
                    },
                    move |err| {
                        log::error!("Input stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
            input_stream = Some(stream);
            output_stream = None;
        }

        log::info!(
            "Stream opened: {} in / {} out, {}, {} Hz, {} frames (~{:.1}ms)",
            params.input_channels,
            params.output_channels,
            params.sample_format,
            rate,
            frames,
            buffer_period * 1000.0
        );

        Ok(Box::new(CpalEngineStream {
            input: input_stream,
            output: output_stream,
            clock,
            shared,
            sample_rate: rate,
            frames_per_buffer: frames,
            input_latency,
            output_latency,
        }))
    }

    fn devices(&self) -> AudioResult<Vec<DeviceInfo>> {
        device::get_devices()
    }

    fn host_apis(&self) -> AudioResult<Vec<HostApiInfo>> {
        device::get_host_apis()
    }

    fn default_input_device(&self) -> AudioResult<Option<usize>> {
        device::default_input_device()
    }

    fn default_output_device(&self) -> AudioResult<Option<usize>> {
        device::default_output_device()
    }
}

fn resolve_input_device(params: &StreamParams) -> AudioResult<cpal::Device> {
    let device = match &params.input_device {
        Some(id) => device::find_device(id, Direction::Input)?,
        None => device::default_cpal_input_device()?,
    };
    log::info!(
        "Input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

fn resolve_output_device(params: &StreamParams) -> AudioResult<cpal::Device> {
    let device = match &params.output_device {
        Some(id) => device::find_device(id, Direction::Output)?,
        None => device::default_cpal_output_device()?,
    };
    log::info!(
        "Output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// One open cpal stream pair
///
/// Keeps the cpal streams alive; dropping them (in `close`) tears down their
/// callbacks, after which the trampoline is never invoked again.
struct CpalEngineStream {
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
    clock: Instant,
    shared: Arc<SharedStreamState>,
    sample_rate: u32,
    frames_per_buffer: u32,
    input_latency: f64,
    output_latency: f64,
}

impl CpalEngineStream {
    fn pause_streams(&self, op: &str) -> AudioResult<()> {
        if let Some(s) = &self.output {
            s.pause()
                .map_err(|e| AudioError::StreamControl(format!("{} output: {}", op, e)))?;
        }
        if let Some(s) = &self.input {
            s.pause()
                .map_err(|e| AudioError::StreamControl(format!("{} input: {}", op, e)))?;
        }
        Ok(())
    }
}

impl EngineStream for CpalEngineStream {
    fn start(&mut self) -> AudioResult<()> {
        // Capture first so duplex streams have input available immediately
        if let Some(s) = &self.input {
            s.play()
                .map_err(|e| AudioError::StreamControl(format!("start input: {}", e)))?;
        }
        if let Some(s) = &self.output {
            s.play()
                .map_err(|e| AudioError::StreamControl(format!("start output: {}", e)))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        // cpal has no drain-then-pause, so wait two buffer periods for
        // queued device buffers to play out before pausing.
        let drain = Duration::from_secs_f64(
            2.0 * self.frames_per_buffer as f64 / self.sample_rate as f64,
        );
        std::thread::sleep(drain);
        self.pause_streams("stop")
    }

    fn abort(&mut self) -> AudioResult<()> {
        self.pause_streams("abort")
    }

    fn close(&mut self) -> AudioResult<()> {
        self.input.take();
        self.output.take();
        log::debug!("Stream closed");
        Ok(())
    }

    fn time(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    fn cpu_load(&self) -> f64 {
        self.shared.cpu_load()
    }

    fn info(&self) -> AudioResult<StreamInfo> {
        Ok(StreamInfo {
            input_latency: self.input_latency,
            output_latency: self.output_latency,
            sample_rate: self.sample_rate as f64,
        })
    }
}

/// Push a captured block into the duplex ring, whole frames only
///
/// When the ring cannot take the whole block the tail is dropped rather
/// than split mid-frame (the playback side is behind anyway), so the
/// consumer always pops channel-aligned data.
fn push_frames(producer: &mut rtrb::Producer<u8>, block: &[u8], frame_bytes: usize) {
    let writable = producer.slots() / frame_bytes * frame_bytes;
    let len = block.len().min(writable) / frame_bytes * frame_bytes;
    if len == 0 {
        return;
    }
    if let Ok(mut chunk) = producer.write_chunk(len) {
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&block[..split]);
        second.copy_from_slice(&block[split..len]);
        chunk.commit_all();
    }
}

/// Fill `scratch` from the duplex ring, popping whole frames only
///
/// The unfilled tail is zeroed so the callback still sees a full,
/// aligned input block. Returns `true` when the ring ran dry.
fn fill_from_ring(
    consumer: &mut rtrb::Consumer<u8>,
    scratch: &mut [u8],
    frame_bytes: usize,
) -> bool {
    let available = consumer.slots() / frame_bytes * frame_bytes;
    let take = scratch.len().min(available);
    if take > 0 {
        if let Ok(chunk) = consumer.read_chunk(take) {
            let (first, second) = chunk.as_slices();
            scratch[..first.len()].copy_from_slice(first);
            scratch[first.len()..take].copy_from_slice(second);
            chunk.commit_all();
        }
    }
    if take < scratch.len() {
        scratch[take..].fill(0);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two channels of i16
    const FRAME: usize = 4;

    #[test]
    fn overflow_drops_whole_frames_only() {
        // Capacity that is not a multiple of the frame size, so a byte-wise
        // push could leave a partial frame at the boundary.
        let (mut producer, mut consumer) = rtrb::RingBuffer::<u8>::new(6);
        let block: Vec<u8> = (1..=12).collect();
        push_frames(&mut producer, &block, FRAME);

        assert_eq!(consumer.slots(), FRAME);
        let mut scratch = [0u8; FRAME];
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [1, 2, 3, 4]);
    }

    #[test]
    fn alignment_survives_overflow() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<u8>::new(2 * FRAME);
        // Three frames into a two-frame ring: the third is dropped whole.
        let block: Vec<u8> = (1..=12).collect();
        push_frames(&mut producer, &block, FRAME);

        let mut scratch = [0u8; FRAME];
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [1, 2, 3, 4]);

        // The next captured frame still pops out on a frame boundary,
        // channel 0 first.
        push_frames(&mut producer, &[21, 22, 23, 24], FRAME);
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [5, 6, 7, 8]);
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [21, 22, 23, 24]);
    }

    #[test]
    fn underrun_zero_fills_and_reports() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<u8>::new(4 * FRAME);
        push_frames(&mut producer, &[1, 2, 3, 4], FRAME);

        let mut scratch = [0xAAu8; 2 * FRAME];
        assert!(fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(&scratch[..FRAME], &[1, 2, 3, 4]);
        assert_eq!(&scratch[FRAME..], &[0, 0, 0, 0]);
    }

    #[test]
    fn empty_ring_is_a_full_underrun() {
        let (_producer, mut consumer) = rtrb::RingBuffer::<u8>::new(4 * FRAME);
        let mut scratch = [0xAAu8; FRAME];
        assert!(fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [0u8; FRAME]);
    }

    #[test]
    fn transfer_survives_ring_wraparound() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<u8>::new(2 * FRAME);
        push_frames(&mut producer, &[1, 2, 3, 4], FRAME);
        let mut scratch = [0u8; FRAME];
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));

        // Two frames that straddle the ring's physical end.
        push_frames(&mut producer, &[5, 6, 7, 8, 9, 10, 11, 12], FRAME);
        let mut scratch = [0u8; 2 * FRAME];
        assert!(!fill_from_ring(&mut consumer, &mut scratch, FRAME));
        assert_eq!(scratch, [5, 6, 7, 8, 9, 10, 11, 12]);
    }
}
