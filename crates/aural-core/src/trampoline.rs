//! The real-time callback trampoline
//!
//! [`Trampoline::process`] is what the engine invokes on its audio thread,
//! once per buffer. Invocations for one stream are strictly sequential;
//! distinct streams may run concurrently and share nothing mutable.
//!
//! The user callback runs inside `catch_unwind`, so a panic can never unwind
//! into the engine. After a panic, or after the callback returns
//! [`StreamFlow::Complete`] or [`StreamFlow::Abort`], the trampoline emits
//! silence and never invokes the callback again for this stream.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::format::{Sample, SampleFormat};
use crate::marshal::{self, MarshalBuffers};
use crate::types::{StatusFlags, StreamFlow, TimeInfo};

/// The user-supplied stream callback
///
/// Receives the marshalled input sequence, the writable output sequence
/// (pre-filled with the native buffer's current contents), per-invocation
/// timing and status flags; returns the control decision.
pub type StreamCallback =
    Box<dyn FnMut(&[Sample], &mut [Sample], &TimeInfo, StatusFlags) -> StreamFlow + Send + 'static>;

/// Durable per-stream state handed to every trampoline invocation
///
/// Built once per stream at open time and owned by the engine's audio
/// thread for the stream's lifetime. The metadata is immutable; only the
/// callback itself is stateful.
pub struct CallbackContext {
    pub callback: StreamCallback,
    pub input_channels: usize,
    pub output_channels: usize,
    pub format: SampleFormat,
}

/// Lock-free state shared between the controlling thread and the audio thread
///
/// The controlling thread reads activity, flow and CPU load through relaxed
/// atomics; the fatal message is behind a mutex that the audio thread locks
/// at most once, when recording a panic.
pub struct SharedStreamState {
    started: AtomicBool,
    flow: AtomicU8,
    fatal: AtomicBool,
    fatal_message: Mutex<Option<String>>,
    cpu_load_bits: AtomicU64,
}

impl SharedStreamState {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            flow: AtomicU8::new(StreamFlow::Continue.as_u8()),
            fatal: AtomicBool::new(false),
            fatal_message: Mutex::new(None),
            cpu_load_bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    pub fn mark_started(&self) {
        self.flow
            .store(StreamFlow::Continue.as_u8(), Ordering::Relaxed);
        self.started.store(true, Ordering::Relaxed);
    }

    pub fn mark_stopped(&self) {
        self.started.store(false, Ordering::Relaxed);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn flow(&self) -> StreamFlow {
        StreamFlow::from_u8(self.flow.load(Ordering::Relaxed))
    }

    pub fn set_flow(&self, flow: StreamFlow) {
        self.flow.store(flow.as_u8(), Ordering::Relaxed);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Record a fatal callback failure; the stream is aborted
    pub fn record_fatal(&self, message: String) {
        if let Ok(mut slot) = self.fatal_message.lock() {
            slot.get_or_insert(message);
        }
        self.flow.store(StreamFlow::Abort.as_u8(), Ordering::Relaxed);
        self.fatal.store(true, Ordering::Release);
    }

    /// The recorded failure message, if the callback ever failed
    pub fn fatal_message(&self) -> Option<String> {
        if !self.is_fatal() {
            return None;
        }
        self.fatal_message
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Fold one measured callback-duration/budget ratio into the load estimate
    pub fn record_cpu_load(&self, load: f64) {
        let prev = f64::from_bits(self.cpu_load_bits.load(Ordering::Relaxed));
        let next = if prev == 0.0 {
            load
        } else {
            prev * 0.9 + load * 0.1
        };
        self.cpu_load_bits.store(next.to_bits(), Ordering::Relaxed);
    }

    pub fn cpu_load(&self) -> f64 {
        f64::from_bits(self.cpu_load_bits.load(Ordering::Relaxed))
    }
}

impl Default for SharedStreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// The function object registered with the engine as its stream callback
///
/// Owned by the engine's audio thread after open; everything it touches per
/// invocation is pre-allocated.
pub struct Trampoline {
    ctx: CallbackContext,
    buffers: MarshalBuffers,
    shared: Arc<SharedStreamState>,
}

impl Trampoline {
    pub fn new(ctx: CallbackContext, shared: Arc<SharedStreamState>) -> Self {
        let buffers = MarshalBuffers::new(ctx.format, ctx.input_channels, ctx.output_channels);
        Self {
            ctx,
            buffers,
            shared,
        }
    }

    pub fn shared(&self) -> &Arc<SharedStreamState> {
        &self.shared
    }

    /// One engine invocation: marshal in, run the callback, marshal out
    ///
    /// `input_bytes`/`output_bytes` cover exactly `frames` interleaved
    /// frames in the stream's format and are only valid for this call.
    pub fn process(
        &mut self,
        input_bytes: &[u8],
        output_bytes: &mut [u8],
        frames: usize,
        time: TimeInfo,
        flags: StatusFlags,
    ) -> StreamFlow {
        debug_assert_eq!(
            input_bytes.len(),
            frames * self.ctx.input_channels * self.ctx.format.size_in_bytes()
        );
        debug_assert_eq!(
            output_bytes.len(),
            frames * self.ctx.output_channels * self.ctx.format.size_in_bytes()
        );

        let flow = self.shared.flow();
        if flow != StreamFlow::Continue {
            // Terminal state; the engine may deliver a few more buffers
            // before it reacts to the control code.
            marshal::fill_silence(self.ctx.format, output_bytes);
            return flow;
        }

        self.buffers.stage(input_bytes, output_bytes);
        let (input, output) = self.buffers.sequences();
        let callback = &mut self.ctx.callback;
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| callback(input, output, &time, flags)));

        match result {
            Ok(flow) => {
                self.buffers.commit(output_bytes);
                if flow != StreamFlow::Continue {
                    log::debug!("stream callback requested {:?}", flow);
                    self.shared.set_flow(flow);
                }
                flow
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("stream callback panicked: {}; aborting stream", message);
                marshal::fill_silence(self.ctx.format, output_bytes);
                self.shared.record_fatal(message);
                StreamFlow::Abort
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn float_trampoline(
        callback: impl FnMut(&[Sample], &mut [Sample], &TimeInfo, StatusFlags) -> StreamFlow
            + Send
            + 'static,
    ) -> Trampoline {
        let ctx = CallbackContext {
            callback: Box::new(callback),
            input_channels: 0,
            output_channels: 2,
            format: SampleFormat::F32,
        };
        Trampoline::new(ctx, Arc::new(SharedStreamState::new()))
    }

    #[test]
    fn continue_path_commits_output() {
        let mut trampoline = float_trampoline(|_input, output, _time, _flags| {
            for s in output.iter_mut() {
                *s = Sample::Float(0.25);
            }
            StreamFlow::Continue
        });
        let mut bytes = vec![0u8; 4 * 2 * 4];
        let flow = trampoline.process(
            &[],
            &mut bytes,
            4,
            TimeInfo::default(),
            StatusFlags::default(),
        );
        assert_eq!(flow, StreamFlow::Continue);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert!(floats.iter().all(|&f| f == 0.25));
    }

    #[test]
    fn terminal_flow_stops_invoking_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_cb = calls.clone();
        let mut trampoline = float_trampoline(move |_input, output, _time, _flags| {
            calls_in_cb.fetch_add(1, Ordering::Relaxed);
            for s in output.iter_mut() {
                *s = Sample::Float(1.0);
            }
            StreamFlow::Complete
        });
        let mut bytes = vec![0u8; 2 * 2 * 4];
        let flow = trampoline.process(
            &[],
            &mut bytes,
            2,
            TimeInfo::default(),
            StatusFlags::default(),
        );
        assert_eq!(flow, StreamFlow::Complete);
        assert_eq!(trampoline.shared().flow(), StreamFlow::Complete);

        // The engine delivers one more buffer; the callback must not run and
        // the output must be silence.
        let flow = trampoline.process(
            &[],
            &mut bytes,
            2,
            TimeInfo::default(),
            StatusFlags::default(),
        );
        assert_eq!(flow, StreamFlow::Complete);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert!(floats.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn panicking_callback_aborts_with_silence() {
        let mut trampoline =
            float_trampoline(|_input, _output, _time, _flags| panic!("callback exploded"));
        let mut bytes = vec![0xAAu8; 2 * 2 * 4];
        let flow = trampoline.process(
            &[],
            &mut bytes,
            2,
            TimeInfo::default(),
            StatusFlags::default(),
        );
        assert_eq!(flow, StreamFlow::Abort);
        assert!(trampoline.shared().is_fatal());
        assert_eq!(
            trampoline.shared().fatal_message().as_deref(),
            Some("callback exploded")
        );
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert!(floats.iter().all(|&f| f == 0.0));

        // Subsequent invocations stay silent and never reach the callback.
        let flow = trampoline.process(
            &[],
            &mut bytes,
            2,
            TimeInfo::default(),
            StatusFlags::default(),
        );
        assert_eq!(flow, StreamFlow::Abort);
    }

    #[test]
    fn input_sequence_reaches_the_callback_interleaved() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_cb = seen.clone();
        let ctx = CallbackContext {
            callback: Box::new(move |input, _output, _time, _flags| {
                if let Ok(mut s) = seen_in_cb.lock() {
                    s.extend(input.iter().map(|v| v.as_i64()));
                }
                StreamFlow::Continue
            }),
            input_channels: 2,
            output_channels: 0,
            format: SampleFormat::I16,
        };
        let mut trampoline = Trampoline::new(ctx, Arc::new(SharedStreamState::new()));

        let native: [i16; 4] = [100, -100, 200, -200];
        let bytes: &[u8] = bytemuck::cast_slice(&native);
        trampoline.process(bytes, &mut [], 2, TimeInfo::default(), StatusFlags::default());
        assert_eq!(*seen.lock().unwrap(), vec![100, -100, 200, -200]);
    }

    #[test]
    fn cpu_load_smooths_toward_recent_measurements() {
        let shared = SharedStreamState::new();
        assert_eq!(shared.cpu_load(), 0.0);
        shared.record_cpu_load(0.5);
        assert_eq!(shared.cpu_load(), 0.5);
        shared.record_cpu_load(0.1);
        let load = shared.cpu_load();
        assert!(load < 0.5 && load > 0.1);
    }
}
