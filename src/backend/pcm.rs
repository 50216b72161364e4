//! PCM quantization kernels: clamp to [-1, 1], scale to the integer range of
//! the target bit depth, write interleaved little-endian samples.

use std::sync::Arc;

use rayon::prelude::*;

use super::slot::LoadError;
use super::{accelerated_allowed, BackendConfig};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Sixteen,
    TwentyFour,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest positive integer value; negative full scale is its negation.
    pub fn full_scale(self) -> f32 {
        match self {
            BitDepth::Sixteen => 32767.0,
            BitDepth::TwentyFour => 8388607.0,
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = EngineError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            other => Err(EngineError::UnsupportedBitDepth(other)),
        }
    }
}

/// Quantization kernels. `out` is pre-sized by the caller to exactly
/// `frames * channels * bytes` and receives the interleaved data.
pub trait PcmKernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn mono_16(&self, samples: &[f32], out: &mut [u8]);

    fn stereo_16(&self, left: &[f32], right: &[f32], out: &mut [u8]);

    fn mono_24(&self, samples: &[f32], out: &mut [u8]);

    fn stereo_24(&self, left: &[f32], right: &[f32], out: &mut [u8]);
}

#[inline]
fn quantize(sample: f32, full_scale: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * full_scale).round() as i32
}

#[inline]
fn put_16(out: &mut [u8], sample: f32) {
    let value = quantize(sample, BitDepth::Sixteen.full_scale()) as i16;
    out.copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn put_24(out: &mut [u8], sample: f32) {
    let value = quantize(sample, BitDepth::TwentyFour.full_scale());
    out.copy_from_slice(&value.to_le_bytes()[..3]);
}

fn write_mono_16(samples: &[f32], out: &mut [u8]) {
    for (bytes, &s) in out.chunks_exact_mut(2).zip(samples) {
        put_16(bytes, s);
    }
}

fn write_stereo_16(left: &[f32], right: &[f32], out: &mut [u8]) {
    for ((frame, &l), &r) in out.chunks_exact_mut(4).zip(left).zip(right) {
        put_16(&mut frame[..2], l);
        put_16(&mut frame[2..], r);
    }
}

fn write_mono_24(samples: &[f32], out: &mut [u8]) {
    for (bytes, &s) in out.chunks_exact_mut(3).zip(samples) {
        put_24(bytes, s);
    }
}

fn write_stereo_24(left: &[f32], right: &[f32], out: &mut [u8]) {
    for ((frame, &l), &r) in out.chunks_exact_mut(6).zip(left).zip(right) {
        put_24(&mut frame[..3], l);
        put_24(&mut frame[3..], r);
    }
}

/// Sequential sample-by-sample quantization.
#[derive(Debug, Default)]
pub struct ReferencePcmKernel;

impl PcmKernel for ReferencePcmKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn mono_16(&self, samples: &[f32], out: &mut [u8]) {
        write_mono_16(samples, out);
    }

    fn stereo_16(&self, left: &[f32], right: &[f32], out: &mut [u8]) {
        write_stereo_16(left, right, out);
    }

    fn mono_24(&self, samples: &[f32], out: &mut [u8]) {
        write_mono_24(samples, out);
    }

    fn stereo_24(&self, left: &[f32], right: &[f32], out: &mut [u8]) {
        write_stereo_24(left, right, out);
    }
}

/// Frames per parallel task.
const CHUNK_FRAMES: usize = 16 * 1024;

/// Splits the output into fixed frame blocks and quantizes them on the rayon
/// pool. Produces the same bytes as the reference kernel.
#[derive(Debug, Default)]
pub struct ChunkedPcmKernel;

impl PcmKernel for ChunkedPcmKernel {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn mono_16(&self, samples: &[f32], out: &mut [u8]) {
        out.par_chunks_mut(CHUNK_FRAMES * 2)
            .zip(samples.par_chunks(CHUNK_FRAMES))
            .for_each(|(o, s)| write_mono_16(s, o));
    }

    fn stereo_16(&self, left: &[f32], right: &[f32], out: &mut [u8]) {
        out.par_chunks_mut(CHUNK_FRAMES * 4)
            .zip(left.par_chunks(CHUNK_FRAMES))
            .zip(right.par_chunks(CHUNK_FRAMES))
            .for_each(|((o, l), r)| write_stereo_16(l, r, o));
    }

    fn mono_24(&self, samples: &[f32], out: &mut [u8]) {
        out.par_chunks_mut(CHUNK_FRAMES * 3)
            .zip(samples.par_chunks(CHUNK_FRAMES))
            .for_each(|(o, s)| write_mono_24(s, o));
    }

    fn stereo_24(&self, left: &[f32], right: &[f32], out: &mut [u8]) {
        out.par_chunks_mut(CHUNK_FRAMES * 6)
            .zip(left.par_chunks(CHUNK_FRAMES))
            .zip(right.par_chunks(CHUNK_FRAMES))
            .for_each(|((o, l), r)| write_stereo_24(l, r, o));
    }
}

pub fn load_chunked_kernel(config: &BackendConfig) -> Result<Arc<dyn PcmKernel>, LoadError> {
    accelerated_allowed(config)?;

    let probe: Vec<f32> = (0..4099).map(|n| ((n as f32) * 0.013).sin() * 1.2).collect();
    let mut expected = vec![0u8; probe.len() * 3];
    let mut actual = vec![0u8; probe.len() * 3];
    ReferencePcmKernel.mono_24(&probe, &mut expected);
    ChunkedPcmKernel.mono_24(&probe, &mut actual);

    if expected != actual {
        let max_error = expected
            .iter()
            .zip(&actual)
            .map(|(a, b)| (*a as f64 - *b as f64).abs())
            .fold(0.0f64, f64::max);
        return Err(LoadError::SelfCheckFailed { max_error });
    }
    Ok(Arc::new(ChunkedPcmKernel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|n| -1.5 + 3.0 * n as f32 / len as f32).collect()
    }

    #[test]
    fn quantization_clamps_and_scales() {
        let samples = [0.0, 1.0, -1.0, 2.0, -3.0, 0.5];
        let mut out = vec![0u8; samples.len() * 2];
        ReferencePcmKernel.mono_16(&samples, &mut out);

        let values: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, 32767, -32767, 32767, -32767, 16384]);
    }

    #[test]
    fn twenty_four_bit_is_little_endian_three_bytes() {
        let mut out = vec![0u8; 6];
        ReferencePcmKernel.mono_24(&[1.0, -1.0], &mut out);
        assert_eq!(&out[..3], &[0xFF, 0xFF, 0x7F]);
        assert_eq!(&out[3..], &[0x01, 0x00, 0x80]);
    }

    #[test]
    fn stereo_interleaves_left_then_right() {
        let mut out = vec![0u8; 8];
        ReferencePcmKernel.stereo_16(&[1.0, 0.0], &[-1.0, 0.5], &mut out);
        assert_eq!(&out[0..2], &32767i16.to_le_bytes());
        assert_eq!(&out[2..4], &(-32767i16).to_le_bytes());
        assert_eq!(&out[4..6], &0i16.to_le_bytes());
        assert_eq!(&out[6..8], &16384i16.to_le_bytes());
    }

    #[test]
    fn chunked_kernel_matches_reference_bytes() {
        let left = ramp(50_001);
        let right: Vec<f32> = left.iter().map(|s| -s * 0.7).collect();

        let kernels: [&dyn PcmKernel; 2] = [&ReferencePcmKernel, &ChunkedPcmKernel];
        let mut outputs = Vec::new();
        for kernel in kernels {
            let mut m16 = vec![0u8; left.len() * 2];
            let mut s16 = vec![0u8; left.len() * 4];
            let mut m24 = vec![0u8; left.len() * 3];
            let mut s24 = vec![0u8; left.len() * 6];
            kernel.mono_16(&left, &mut m16);
            kernel.stereo_16(&left, &right, &mut s16);
            kernel.mono_24(&left, &mut m24);
            kernel.stereo_24(&left, &right, &mut s24);
            outputs.push((m16, s16, m24, s24));
        }
        assert!(outputs[0] == outputs[1]);
    }

    #[test]
    fn bit_depth_from_bits() {
        assert_eq!(BitDepth::try_from(16).unwrap(), BitDepth::Sixteen);
        assert_eq!(BitDepth::try_from(24).unwrap(), BitDepth::TwentyFour);
        assert!(matches!(BitDepth::try_from(8), Err(EngineError::UnsupportedBitDepth(8))));
    }
}
