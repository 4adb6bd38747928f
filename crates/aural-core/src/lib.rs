//! Aural - a real-time audio callback bridge
//!
//! Wraps a native audio engine (cpal) behind a small, PortAudio-flavored
//! surface: open a [`Stream`] with channel counts, a sample format, a rate
//! and a buffer size, hand it a callback, and the bridge invokes that
//! callback on the engine's audio thread with marshalled sample sequences.
//!
//! # Architecture
//!
//! - **Controlling thread**: owns the [`Stream`] handle; start/stop/close
//!   and queries. State reads go through lock-free atomics.
//! - **Audio thread(s)**: driven by the engine; each invocation runs the
//!   trampoline, which marshals native interleaved buffers to [`Sample`]
//!   sequences, runs the user callback under an unwind barrier, writes the
//!   output back, and returns a [`StreamFlow`] control code.
//!
//! Invocations for one stream are strictly sequential; distinct streams may
//! run concurrently and share nothing mutable.
//!
//! # Example
//!
//! ```ignore
//! use aural_core::{open_default_stream, Sample, StreamFlow, StreamParams};
//!
//! let params = StreamParams::output_only(2).with_sample_rate(44100);
//! let mut stream = open_default_stream(&params, |_input, output, _time, _flags| {
//!     for s in output.iter_mut() {
//!         *s = Sample::Float(0.0);
//!     }
//!     StreamFlow::Continue
//! })?;
//! stream.start()?;
//! // ... later
//! stream.stop()?;
//! stream.close()?;
//! # Ok::<(), aural_core::AudioError>(())
//! ```

pub mod cpal_backend;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod marshal;
pub mod stream;
pub mod trampoline;
pub mod types;

pub use cpal_backend::CpalEngine;
pub use device::{DeviceInfo, HostApiInfo};
pub use engine::{Engine, EngineStream};
pub use error::{AudioError, AudioResult};
pub use format::{Sample, SampleFormat};
pub use stream::{open_default_stream, Stream};
pub use types::{
    DeviceId, StatusFlags, StreamFlow, StreamInfo, StreamParams, TimeInfo,
    DEFAULT_FRAMES_PER_BUFFER, DEFAULT_SAMPLE_RATE, MAX_FRAMES_PER_BUFFER,
};
