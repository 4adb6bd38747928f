//! Common types for the audio bridge
//!
//! Stream parameters, per-invocation timing, callback control codes and
//! status flags shared between the public handle, the trampoline and the
//! engine backends.

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, AudioResult};
use crate::format::SampleFormat;

/// Default sample rate when none is requested (48kHz - standard professional audio rate)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default buffer size in frames (a safe value on most systems)
pub const DEFAULT_FRAMES_PER_BUFFER: u32 = 512;

/// Maximum buffer size the marshaller pre-allocates for (frames)
/// Generous enough for every buffer size hosts hand out in practice
/// (64 up to 8192 frames)
pub const MAX_FRAMES_PER_BUFFER: usize = 8192;

/// Timestamps for one callback invocation
///
/// All three values come from the same monotonic clock as
/// [`Stream::time`](crate::stream::Stream::time); the origin is unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeInfo {
    /// Capture time of the first input sample (0.0 for output-only streams)
    pub input_adc_time: f64,
    /// Time at which the callback was invoked
    pub current_time: f64,
    /// Output time of the first output sample (0.0 for input-only streams)
    pub output_dac_time: f64,
}

/// Control decision returned by the stream callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFlow {
    /// Keep the stream running
    #[default]
    Continue,
    /// Finish once buffered audio has played out
    Complete,
    /// Stop as soon as possible, discarding buffered audio
    Abort,
}

impl StreamFlow {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            StreamFlow::Continue => 0,
            StreamFlow::Complete => 1,
            StreamFlow::Abort => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> StreamFlow {
        match v {
            0 => StreamFlow::Continue,
            1 => StreamFlow::Complete,
            _ => StreamFlow::Abort,
        }
    }
}

/// Buffer over/underrun indicators for one callback invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    /// Input data was lost before the callback could see it
    pub input_overflow: bool,
    /// The callback ran without enough captured input; gaps were silenced
    pub input_underflow: bool,
    /// Output data was inserted late; the device played silence
    pub output_underflow: bool,
    /// Output data could not be delivered in time
    pub output_overflow: bool,
    /// The engine is priming the output with initial buffers
    pub priming_output: bool,
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, WASAPI, etc.)
/// so a device can be selected unambiguously on systems with multiple audio
/// hosts available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "Alsa", "CoreAudio")
    /// If None, searches all available hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Parameters for opening a stream
///
/// The format, channel counts and sample rate are fixed for the stream's
/// lifetime. A stream may be output-only, input-only, or full duplex
/// depending on the channel counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamParams {
    /// Number of input (capture) channels; 0 for output-only streams
    pub input_channels: u16,
    /// Number of output (playback) channels; 0 for input-only streams
    pub output_channels: u16,
    /// Native sample format of the stream's buffers
    pub sample_format: SampleFormat,
    /// Requested sample rate in Hz
    pub sample_rate: u32,
    /// Requested buffer size in frames (a hint; the device may adjust it)
    pub frames_per_buffer: u32,
    /// Input device (None = system default)
    pub input_device: Option<DeviceId>,
    /// Output device (None = system default)
    pub output_device: Option<DeviceId>,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            input_channels: 0,
            output_channels: 2,
            sample_format: SampleFormat::F32,
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames_per_buffer: DEFAULT_FRAMES_PER_BUFFER,
            input_device: None,
            output_device: None,
        }
    }
}

impl StreamParams {
    /// Stereo output at the default sample rate
    pub fn output_only(channels: u16) -> Self {
        Self {
            output_channels: channels,
            ..Default::default()
        }
    }

    /// Capture-only stream
    pub fn input_only(channels: u16) -> Self {
        Self {
            input_channels: channels,
            output_channels: 0,
            ..Default::default()
        }
    }

    /// Full-duplex stream
    pub fn duplex(input_channels: u16, output_channels: u16) -> Self {
        Self {
            input_channels,
            output_channels,
            ..Default::default()
        }
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_frames_per_buffer(mut self, frames: u32) -> Self {
        self.frames_per_buffer = frames;
        self
    }

    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Reject configurations the bridge cannot serve, before any engine
    /// resource is allocated
    pub fn validate(&self) -> AudioResult<()> {
        if !self.sample_format.is_marshallable() {
            return Err(AudioError::UnsupportedFormat(self.sample_format));
        }
        if self.input_channels == 0 && self.output_channels == 0 {
            return Err(AudioError::InvalidChannels {
                input: self.input_channels,
                output: self.output_channels,
            });
        }
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedConfig(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if self.frames_per_buffer == 0
            || self.frames_per_buffer as usize > MAX_FRAMES_PER_BUFFER
        {
            return Err(AudioError::UnsupportedConfig(format!(
                "frames per buffer must be in 1..={} (got {})",
                MAX_FRAMES_PER_BUFFER, self.frames_per_buffer
            )));
        }
        Ok(())
    }
}

/// Measured stream characteristics, as estimated by the engine
///
/// May differ from the values requested at open time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Input latency in seconds (0.0 for output-only streams)
    pub input_latency: f64,
    /// Output latency in seconds (0.0 for input-only streams)
    pub output_latency: f64,
    /// Actual sample rate in Hz
    pub sample_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_stereo_output() {
        let params = StreamParams::default();
        assert_eq!(params.input_channels, 0);
        assert_eq!(params.output_channels, 2);
        assert_eq!(params.sample_format, SampleFormat::F32);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_rejects_packed_24_bit() {
        let params = StreamParams::default().with_sample_format(SampleFormat::I24);
        assert!(matches!(
            params.validate(),
            Err(AudioError::UnsupportedFormat(SampleFormat::I24))
        ));
    }

    #[test]
    fn validate_rejects_zero_channels_both_directions() {
        let mut params = StreamParams::default();
        params.output_channels = 0;
        assert!(matches!(
            params.validate(),
            Err(AudioError::InvalidChannels { .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_buffers() {
        let params =
            StreamParams::default().with_frames_per_buffer(MAX_FRAMES_PER_BUFFER as u32 + 1);
        assert!(matches!(
            params.validate(),
            Err(AudioError::UnsupportedConfig(_))
        ));
    }

    #[test]
    fn flow_codes_round_trip() {
        for flow in [StreamFlow::Continue, StreamFlow::Complete, StreamFlow::Abort] {
            assert_eq!(StreamFlow::from_u8(flow.as_u8()), flow);
        }
    }
}
