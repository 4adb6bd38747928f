//! The public stream handle
//!
//! A [`Stream`] is in exactly one of three states: open-inactive (after a
//! successful open), active (after `start`), or closed (after `close`).
//! Operations on a closed stream fail with [`AudioError::StreamClosed`];
//! after the callback fails on the audio thread, operations fail with
//! [`AudioError::CallbackFailed`] until the stream is closed.

use std::sync::Arc;

use crate::cpal_backend::CpalEngine;
use crate::engine::{Engine, EngineStream};
use crate::error::{AudioError, AudioResult};
use crate::format::Sample;
use crate::trampoline::{CallbackContext, SharedStreamState, Trampoline};
use crate::types::{StatusFlags, StreamFlow, StreamInfo, StreamParams, TimeInfo};

/// A single stream of real-time audio input and/or output
///
/// The handle lives on the controlling thread; the registered callback runs
/// on the engine's audio thread. Dropping the handle closes the stream.
pub struct Stream {
    inner: Option<Box<dyn EngineStream>>,
    shared: Arc<SharedStreamState>,
}

impl Stream {
    /// Open a stream on `engine`
    ///
    /// Parameters are validated before the engine allocates anything, so a
    /// rejected configuration never leaks a native resource. The returned
    /// stream is open but inactive until [`start`](Stream::start).
    pub fn open<F>(engine: &dyn Engine, params: &StreamParams, callback: F) -> AudioResult<Stream>
    where
        F: FnMut(&[Sample], &mut [Sample], &TimeInfo, StatusFlags) -> StreamFlow
            + Send
            + 'static,
    {
        params.validate()?;

        let shared = Arc::new(SharedStreamState::new());
        let ctx = CallbackContext {
            callback: Box::new(callback),
            input_channels: params.input_channels as usize,
            output_channels: params.output_channels as usize,
            format: params.sample_format,
        };
        let trampoline = Trampoline::new(ctx, shared.clone());
        let inner = engine.open_stream(params, trampoline)?;

        Ok(Stream {
            inner: Some(inner),
            shared,
        })
    }

    fn check_callback(&self) -> AudioResult<()> {
        match self.shared.fatal_message() {
            Some(message) => Err(AudioError::CallbackFailed(message)),
            None => Ok(()),
        }
    }

    /// Commence audio processing
    pub fn start(&mut self) -> AudioResult<()> {
        self.check_callback()?;
        if self.shared.is_started() {
            return Err(AudioError::StreamControl(
                "stream is already started".to_string(),
            ));
        }
        let inner = self.inner.as_mut().ok_or(AudioError::StreamClosed)?;
        inner.start()?;
        self.shared.mark_started();
        Ok(())
    }

    /// Terminate audio processing, waiting until pending buffers have played
    pub fn stop(&mut self) -> AudioResult<()> {
        self.check_callback()?;
        let inner = self.inner.as_mut().ok_or(AudioError::StreamClosed)?;
        inner.stop()?;
        self.shared.mark_stopped();
        Ok(())
    }

    /// Terminate audio processing immediately, discarding pending buffers
    pub fn abort(&mut self) -> AudioResult<()> {
        self.check_callback()?;
        let inner = self.inner.as_mut().ok_or(AudioError::StreamClosed)?;
        inner.abort()?;
        self.shared.mark_stopped();
        Ok(())
    }

    /// Close the stream, releasing the native resource
    ///
    /// If the stream is active this discards pending buffers as if
    /// [`abort`](Stream::abort) had been called. Every subsequent operation
    /// on this handle fails. Close works even after a callback failure; the
    /// native resource must always be releasable.
    pub fn close(&mut self) -> AudioResult<()> {
        let Some(mut inner) = self.inner.take() else {
            return Err(AudioError::StreamClosed);
        };
        if self.shared.is_started() {
            // Best-effort abort; close must proceed regardless
            if let Err(e) = inner.abort() {
                log::warn!("Abort during close failed: {}", e);
            }
            self.shared.mark_stopped();
        }
        inner.close()
    }

    /// Whether the stream is actively calling back
    ///
    /// Active means started and neither completed, aborted, nor failed. A
    /// stream whose callback returned [`StreamFlow::Complete`] becomes
    /// inactive without an explicit [`stop`](Stream::stop), but is not
    /// considered stopped.
    pub fn is_active(&self) -> AudioResult<bool> {
        if self.inner.is_none() {
            return Err(AudioError::StreamClosed);
        }
        Ok(self.shared.is_started()
            && self.shared.flow() == StreamFlow::Continue
            && !self.shared.is_fatal())
    }

    /// Whether the stream is stopped (never started, or stopped/aborted)
    pub fn is_stopped(&self) -> AudioResult<bool> {
        if self.inner.is_none() {
            return Err(AudioError::StreamClosed);
        }
        Ok(!self.shared.is_started())
    }

    /// The stream clock in seconds: monotonically increasing, unspecified
    /// origin, valid for the whole open lifetime independent of start/stop.
    /// Returns 0.0 on error or after close.
    pub fn time(&self) -> f64 {
        self.inner.as_ref().map_or(0.0, |inner| inner.time())
    }

    /// Fraction of the real-time budget consumed by the callback path
    ///
    /// Typically 0.0..=1.0 but may exceed 1.0 under overload. Always 0.0
    /// before the first measurement or after close.
    pub fn cpu_load(&self) -> f64 {
        self.inner.as_ref().map_or(0.0, |inner| inner.cpu_load())
    }

    /// Measured latency and sample rate, which may differ from requested
    pub fn info(&self) -> AudioResult<StreamInfo> {
        self.inner
            .as_ref()
            .ok_or(AudioError::StreamClosed)?
            .info()
    }

    /// The recorded failure, if the callback ever failed on the audio thread
    pub fn callback_error(&self) -> Option<AudioError> {
        self.shared.fatal_message().map(AudioError::CallbackFailed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Failed to close stream on drop: {}", e);
            }
        }
    }
}

/// Open a stream on the default devices of a fresh cpal engine
///
/// Convenience for callers that don't need device selection or engine
/// introspection.
pub fn open_default_stream<F>(params: &StreamParams, callback: F) -> AudioResult<Stream>
where
    F: FnMut(&[Sample], &mut [Sample], &TimeInfo, StatusFlags) -> StreamFlow + Send + 'static,
{
    let engine = CpalEngine::new()?;
    Stream::open(&engine, params, callback)
}
