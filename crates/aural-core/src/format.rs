//! Sample formats and the runtime sample value
//!
//! A stream is opened with a fixed [`SampleFormat`] that determines how the
//! engine's interleaved buffers are laid out in memory. The callback never
//! sees raw bytes; it works with [`Sample`] values, which carry floats as
//! `f64` and every integer format as `i64` (both conversions are exact in
//! the widening direction).

use serde::{Deserialize, Serialize};

/// Native sample format of a stream
///
/// The format is fixed for the stream's lifetime at open time.
/// `Int24` (packed 24-bit) exists for introspection only; opening a stream
/// with it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 32-bit IEEE float, nominal range -1.0..=1.0
    F32,
    /// 32-bit signed integer
    I32,
    /// Packed 24-bit signed integer (not marshallable)
    I24,
    /// 16-bit signed integer
    I16,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer, silence at 128
    U8,
}

impl SampleFormat {
    /// All formats in declaration order
    pub const ALL: [SampleFormat; 6] = [
        SampleFormat::F32,
        SampleFormat::I32,
        SampleFormat::I24,
        SampleFormat::I16,
        SampleFormat::I8,
        SampleFormat::U8,
    ];

    /// Size of one sample in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            SampleFormat::F32 | SampleFormat::I32 => 4,
            SampleFormat::I24 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::I8 | SampleFormat::U8 => 1,
        }
    }

    /// Whether the buffer marshaller handles this format
    pub fn is_marshallable(&self) -> bool {
        !matches!(self, SampleFormat::I24)
    }

    /// The sample value representing silence in this format
    pub fn silence(&self) -> Sample {
        match self {
            SampleFormat::F32 => Sample::Float(0.0),
            SampleFormat::U8 => Sample::Int(128),
            _ => Sample::Int(0),
        }
    }

    /// Map to the cpal sample format, or `None` for formats cpal can't stream
    pub(crate) fn to_cpal(&self) -> Option<cpal::SampleFormat> {
        match self {
            SampleFormat::F32 => Some(cpal::SampleFormat::F32),
            SampleFormat::I32 => Some(cpal::SampleFormat::I32),
            SampleFormat::I24 => None,
            SampleFormat::I16 => Some(cpal::SampleFormat::I16),
            SampleFormat::I8 => Some(cpal::SampleFormat::I8),
            SampleFormat::U8 => Some(cpal::SampleFormat::U8),
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleFormat::F32 => "f32",
            SampleFormat::I32 => "i32",
            SampleFormat::I24 => "i24",
            SampleFormat::I16 => "i16",
            SampleFormat::I8 => "i8",
            SampleFormat::U8 => "u8",
        };
        write!(f, "{}", name)
    }
}

/// A single sample value as seen by the stream callback
///
/// Float formats pass through as `Float`; integer formats widen exactly to
/// `Int`. When the callback writes a value of the "wrong" kind for the
/// stream's format, encoding coerces it: floats are truncated toward zero
/// when an integer is needed, integers are converted when a float is needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Float(f64),
    Int(i64),
}

impl Sample {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Sample::Float(v) => v,
            Sample::Int(v) => v as f64,
        }
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        match self {
            Sample::Float(v) => v as i64,
            Sample::Int(v) => v,
        }
    }
}

impl From<f64> for Sample {
    fn from(v: f64) -> Self {
        Sample::Float(v)
    }
}

impl From<f32> for Sample {
    fn from(v: f32) -> Self {
        Sample::Float(v as f64)
    }
}

impl From<i64> for Sample {
    fn from(v: i64) -> Self {
        Sample::Int(v)
    }
}

impl From<i32> for Sample {
    fn from(v: i32) -> Self {
        Sample::Int(v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_sizes_match_native_widths() {
        assert_eq!(SampleFormat::F32.size_in_bytes(), 4);
        assert_eq!(SampleFormat::I32.size_in_bytes(), 4);
        assert_eq!(SampleFormat::I24.size_in_bytes(), 3);
        assert_eq!(SampleFormat::I16.size_in_bytes(), 2);
        assert_eq!(SampleFormat::I8.size_in_bytes(), 1);
        assert_eq!(SampleFormat::U8.size_in_bytes(), 1);
    }

    #[test]
    fn only_packed_24_bit_is_unmarshallable() {
        for format in SampleFormat::ALL {
            assert_eq!(
                format.is_marshallable(),
                format != SampleFormat::I24,
                "{format}"
            );
            assert_eq!(format.to_cpal().is_some(), format.is_marshallable());
        }
    }

    #[test]
    fn silence_is_midpoint_for_unsigned() {
        assert_eq!(SampleFormat::U8.silence(), Sample::Int(128));
        assert_eq!(SampleFormat::I16.silence(), Sample::Int(0));
        assert_eq!(SampleFormat::F32.silence(), Sample::Float(0.0));
    }

    #[test]
    fn sample_coercions_truncate_toward_zero() {
        assert_eq!(Sample::Float(3.9).as_i64(), 3);
        assert_eq!(Sample::Float(-3.9).as_i64(), -3);
        assert_eq!(Sample::Int(7).as_f64(), 7.0);
    }
}
