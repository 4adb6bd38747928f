//! Audio bridge error types

use thiserror::Error;

use crate::format::SampleFormat;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Engine call returned a non-success status
    #[error("Audio engine error: {0}")]
    Engine(String),

    /// Failed to build an audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Failed to start/stop/abort a stream
    #[error("Failed to control audio stream: {0}")]
    StreamControl(String),

    /// Sample format not supported by the bridge
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(SampleFormat),

    /// Invalid channel configuration
    #[error("Invalid channel configuration: {input} input / {output} output")]
    InvalidChannels { input: u16, output: u16 },

    /// Stream parameters rejected before any engine resource was allocated
    #[error("Unsupported stream configuration: {0}")]
    UnsupportedConfig(String),

    /// Operation on a closed stream
    #[error("Stream is closed")]
    StreamClosed,

    /// The stream callback failed on the audio thread; the stream was aborted
    #[error("Stream callback failed: {0}")]
    CallbackFailed(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
