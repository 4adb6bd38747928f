//! Buffer marshalling between native interleaved memory and runtime samples
//!
//! Converts the engine's interleaved sample buffers (frame-major,
//! channel-interleaved: frame 0 channel 0, frame 0 channel 1, ...) to and
//! from [`Sample`] sequences. All conversions use native byte order and make
//! no alignment assumptions about engine-owned memory.
//!
//! The scratch sequences in [`MarshalBuffers`] are allocated once at stream
//! open; the per-invocation path never allocates.

use crate::format::{Sample, SampleFormat};
use crate::types::MAX_FRAMES_PER_BUFFER;

/// Decode interleaved native bytes into `out`, replacing its contents
///
/// The sample count is `bytes.len() / format.size_in_bytes()`; the caller
/// passes exactly the bytes for one invocation.
pub fn decode_interleaved(format: SampleFormat, bytes: &[u8], out: &mut Vec<Sample>) {
    out.clear();
    match format {
        SampleFormat::F32 => {
            for b in bytes.chunks_exact(4) {
                let v = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                out.push(Sample::Float(v as f64));
            }
        }
        SampleFormat::I32 => {
            for b in bytes.chunks_exact(4) {
                let v = i32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                out.push(Sample::Int(v as i64));
            }
        }
        SampleFormat::I16 => {
            for b in bytes.chunks_exact(2) {
                let v = i16::from_ne_bytes([b[0], b[1]]);
                out.push(Sample::Int(v as i64));
            }
        }
        SampleFormat::I8 => {
            for &b in bytes {
                out.push(Sample::Int(b as i8 as i64));
            }
        }
        SampleFormat::U8 => {
            for &b in bytes {
                out.push(Sample::Int(b as i64));
            }
        }
        SampleFormat::I24 => {
            // Rejected at open; nothing to decode.
            debug_assert!(false, "i24 buffers are never marshalled");
        }
    }
}

/// Encode a sample sequence into interleaved native bytes, same ordering
///
/// Narrowing conversions truncate/wrap with native integer semantics;
/// floats pass through (f64 -> f32 for float streams).
pub fn encode_interleaved(format: SampleFormat, samples: &[Sample], bytes: &mut [u8]) {
    match format {
        SampleFormat::F32 => {
            for (s, b) in samples.iter().zip(bytes.chunks_exact_mut(4)) {
                b.copy_from_slice(&(s.as_f64() as f32).to_ne_bytes());
            }
        }
        SampleFormat::I32 => {
            for (s, b) in samples.iter().zip(bytes.chunks_exact_mut(4)) {
                b.copy_from_slice(&(s.as_i64() as i32).to_ne_bytes());
            }
        }
        SampleFormat::I16 => {
            for (s, b) in samples.iter().zip(bytes.chunks_exact_mut(2)) {
                b.copy_from_slice(&(s.as_i64() as i16).to_ne_bytes());
            }
        }
        SampleFormat::I8 => {
            for (s, b) in samples.iter().zip(bytes.iter_mut()) {
                *b = s.as_i64() as i8 as u8;
            }
        }
        SampleFormat::U8 => {
            for (s, b) in samples.iter().zip(bytes.iter_mut()) {
                *b = s.as_i64() as u8;
            }
        }
        SampleFormat::I24 => {
            debug_assert!(false, "i24 buffers are never marshalled");
        }
    }
}

/// Overwrite a native buffer with this format's silence value
pub fn fill_silence(format: SampleFormat, bytes: &mut [u8]) {
    match format {
        // Unsigned silence sits at the midpoint
        SampleFormat::U8 => bytes.fill(0x80),
        // Zero bytes are silence for every signed/float format
        _ => bytes.fill(0),
    }
}

/// Pre-allocated scratch sequences for one stream
///
/// Sized for [`MAX_FRAMES_PER_BUFFER`] at construction; staged and committed
/// once per trampoline invocation.
pub struct MarshalBuffers {
    format: SampleFormat,
    input: Vec<Sample>,
    output: Vec<Sample>,
}

impl MarshalBuffers {
    pub fn new(format: SampleFormat, input_channels: usize, output_channels: usize) -> Self {
        Self {
            format,
            input: Vec::with_capacity(MAX_FRAMES_PER_BUFFER * input_channels),
            output: Vec::with_capacity(MAX_FRAMES_PER_BUFFER * output_channels),
        }
    }

    /// Populate both sequences from native memory
    ///
    /// The output sequence is pre-filled from the native output buffer's
    /// current contents so the callback can read-modify rather than only
    /// write.
    pub fn stage(&mut self, input_bytes: &[u8], output_bytes: &[u8]) {
        decode_interleaved(self.format, input_bytes, &mut self.input);
        decode_interleaved(self.format, output_bytes, &mut self.output);
    }

    /// The staged sequences, input read-only and output writable
    pub fn sequences(&mut self) -> (&[Sample], &mut [Sample]) {
        (&self.input, &mut self.output)
    }

    /// Write the output sequence back to native memory
    pub fn commit(&self, output_bytes: &mut [u8]) {
        encode_interleaved(self.format, &self.output, output_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARSHALLABLE: [SampleFormat; 5] = [
        SampleFormat::F32,
        SampleFormat::I32,
        SampleFormat::I16,
        SampleFormat::I8,
        SampleFormat::U8,
    ];

    fn bytes_for(format: SampleFormat, values: &[i64]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &v in values {
            match format {
                SampleFormat::I32 => bytes.extend_from_slice(&(v as i32).to_ne_bytes()),
                SampleFormat::I16 => bytes.extend_from_slice(&(v as i16).to_ne_bytes()),
                SampleFormat::I8 => bytes.push(v as i8 as u8),
                SampleFormat::U8 => bytes.push(v as u8),
                _ => unreachable!(),
            }
        }
        bytes
    }

    #[test]
    fn integer_round_trip_is_bit_exact() {
        let cases: [(SampleFormat, &[i64]); 4] = [
            (SampleFormat::I32, &[i32::MIN as i64, -1, 0, 1, i32::MAX as i64, 123456789]),
            (SampleFormat::I16, &[i16::MIN as i64, -1, 0, 1, i16::MAX as i64, 12345]),
            (SampleFormat::I8, &[-128, -1, 0, 1, 127, 42]),
            (SampleFormat::U8, &[0, 1, 127, 128, 200, 255]),
        ];
        for (format, values) in cases {
            let original = bytes_for(format, values);
            let mut decoded = Vec::new();
            decode_interleaved(format, &original, &mut decoded);
            let expected: Vec<Sample> = values.iter().map(|&v| Sample::Int(v)).collect();
            assert_eq!(decoded, expected, "{format} decode");

            let mut encoded = vec![0u8; original.len()];
            encode_interleaved(format, &decoded, &mut encoded);
            assert_eq!(encoded, original, "{format} round trip");
        }
    }

    #[test]
    fn float_round_trip_preserves_bit_patterns() {
        let values: [f32; 7] = [
            0.0,
            -0.0,
            0.5,
            -1.0,
            f32::MIN_POSITIVE,
            1.0e-38,
            12345.678,
        ];
        let original: &[u8] = bytemuck::cast_slice(&values);
        let mut decoded = Vec::new();
        decode_interleaved(SampleFormat::F32, original, &mut decoded);
        assert_eq!(decoded.len(), values.len());

        let mut encoded = vec![0u8; original.len()];
        encode_interleaved(SampleFormat::F32, &decoded, &mut encoded);
        let encoded_f32: &[f32] = bytemuck::cast_slice(&encoded);
        for (a, b) in values.iter().zip(encoded_f32) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn interleaving_order_is_preserved_for_all_formats() {
        // Two stereo frames written as [L0, R0, L1, R1] must land in native
        // memory in that exact order.
        for format in MARSHALLABLE {
            let sequence = [
                match format {
                    SampleFormat::F32 => Sample::Float(10.0),
                    _ => Sample::Int(10),
                },
                match format {
                    SampleFormat::F32 => Sample::Float(20.0),
                    _ => Sample::Int(20),
                },
                match format {
                    SampleFormat::F32 => Sample::Float(30.0),
                    _ => Sample::Int(30),
                },
                match format {
                    SampleFormat::F32 => Sample::Float(40.0),
                    _ => Sample::Int(40),
                },
            ];
            let size = format.size_in_bytes();
            let mut bytes = vec![0u8; 4 * size];
            encode_interleaved(format, &sequence, &mut bytes);

            let mut back = Vec::new();
            decode_interleaved(format, &bytes, &mut back);
            let expected: Vec<i64> = vec![10, 20, 30, 40];
            let got: Vec<i64> = back.iter().map(|s| s.as_i64()).collect();
            assert_eq!(got, expected, "{format}");
        }
    }

    #[test]
    fn narrowing_wraps_with_native_semantics() {
        let mut bytes = [0u8; 1];
        encode_interleaved(SampleFormat::I8, &[Sample::Int(300)], &mut bytes);
        assert_eq!(bytes[0] as i8, 300i64 as i8);

        let mut bytes = [0u8; 2];
        encode_interleaved(SampleFormat::I16, &[Sample::Int(0x1_2345)], &mut bytes);
        assert_eq!(i16::from_ne_bytes(bytes), 0x2345);
    }

    #[test]
    fn cross_kind_writes_coerce() {
        // A float written to an integer stream truncates; an integer written
        // to a float stream converts.
        let mut bytes = [0u8; 2];
        encode_interleaved(SampleFormat::I16, &[Sample::Float(99.7)], &mut bytes);
        assert_eq!(i16::from_ne_bytes(bytes), 99);

        let mut bytes = [0u8; 4];
        encode_interleaved(SampleFormat::F32, &[Sample::Int(3)], &mut bytes);
        assert_eq!(f32::from_ne_bytes(bytes), 3.0);
    }

    #[test]
    fn silence_fill_per_format() {
        let mut bytes = [0xAAu8; 8];
        fill_silence(SampleFormat::U8, &mut bytes);
        assert!(bytes.iter().all(|&b| b == 0x80));

        let mut bytes = [0xAAu8; 8];
        fill_silence(SampleFormat::F32, &mut bytes);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert!(floats.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn output_sequence_is_prefilled_from_native_memory() {
        let mut buffers = MarshalBuffers::new(SampleFormat::I16, 0, 2);
        let stale: [i16; 4] = [5, 6, 7, 8];
        let stale_bytes: &[u8] = bytemuck::cast_slice(&stale);
        buffers.stage(&[], stale_bytes);
        let (input, output) = buffers.sequences();
        assert!(input.is_empty());
        assert_eq!(
            output,
            [Sample::Int(5), Sample::Int(6), Sample::Int(7), Sample::Int(8)]
        );
    }
}
