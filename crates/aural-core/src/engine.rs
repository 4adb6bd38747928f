//! The boundary to the native audio engine
//!
//! The bridge never talks to an audio backend directly; it goes through
//! [`Engine`] to open streams and enumerate devices, and through
//! [`EngineStream`] to drive one open stream's lifecycle. The production
//! implementation is [`CpalEngine`](crate::cpal_backend::CpalEngine); tests
//! substitute a mock that drives the trampoline synchronously.

use crate::device::{DeviceInfo, HostApiInfo};
use crate::error::AudioResult;
use crate::trampoline::Trampoline;
use crate::types::{StreamInfo, StreamParams};

/// A native audio engine
///
/// Constructing an engine initializes it; dropping it terminates it.
/// Instances may overlap freely.
pub trait Engine {
    /// Short backend name, e.g. "cpal"
    fn name(&self) -> &'static str;

    /// Human-readable description of the engine build
    fn version_text(&self) -> String;

    /// Open a stream and register `trampoline` as its callback
    ///
    /// The trampoline is owned by the engine's audio thread from here on
    /// and is invoked strictly sequentially, one buffer at a time, until
    /// the stream is closed.
    fn open_stream(
        &self,
        params: &StreamParams,
        trampoline: Trampoline,
    ) -> AudioResult<Box<dyn EngineStream>>;

    /// All devices across every available host, in stable index order
    fn devices(&self) -> AudioResult<Vec<DeviceInfo>>;

    /// All available host APIs
    fn host_apis(&self) -> AudioResult<Vec<HostApiInfo>>;

    /// Global index of the default input device, if any
    fn default_input_device(&self) -> AudioResult<Option<usize>>;

    /// Global index of the default output device, if any
    fn default_output_device(&self) -> AudioResult<Option<usize>>;
}

/// One open native stream
///
/// After `close` returns, the engine guarantees no further trampoline
/// invocations; releasing the callback context is then safe.
pub trait EngineStream {
    fn start(&mut self) -> AudioResult<()>;

    /// Stop, letting buffered audio finish playing before returning
    fn stop(&mut self) -> AudioResult<()>;

    /// Stop immediately, discarding buffered audio
    fn abort(&mut self) -> AudioResult<()>;

    /// Release the native resource
    fn close(&mut self) -> AudioResult<()>;

    /// Monotonic stream clock in seconds, unspecified origin; 0.0 on error
    fn time(&self) -> f64;

    /// Fraction of the real-time budget consumed by the callback path;
    /// 0.0 if never measured or on error
    fn cpu_load(&self) -> f64;

    /// Measured latency and rate, which may differ from the requested values
    fn info(&self) -> AudioResult<StreamInfo>;
}
