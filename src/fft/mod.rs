//! Radix-2 FFT core: transform, spectral conversions and STFT windows.

pub mod spectrum;
pub mod window;

pub use spectrum::Spectrum;
pub use window::Windows;

use crate::error::{EngineError, Result};

/// Iterative decimation-in-time Cooley-Tukey transform.
///
/// The bit-reversal permutation and the twiddle tables are built once in
/// [`Fft::new`] and shared by every forward/inverse call on frames of this
/// size, so a short-time analysis only pays for the butterflies.
#[derive(Debug, Clone)]
pub struct Fft {
    size: usize,
    bit_reverse: Vec<usize>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    windows: Windows,
}

impl Fft {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(EngineError::InvalidSize(size));
        }

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size)
            .map(|i| {
                if bits == 0 {
                    0
                } else {
                    i.reverse_bits() >> (usize::BITS - bits)
                }
            })
            .collect();

        // Twiddles are evaluated in f64 and narrowed once.
        let half = size / 2;
        let (cos_table, sin_table) = (0..half)
            .map(|k| {
                let angle = 2.0 * std::f64::consts::PI * k as f64 / size as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .unzip();

        Ok(Self {
            size,
            bit_reverse,
            cos_table,
            sin_table,
            windows: Windows::hann(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn windows(&self) -> &Windows {
        &self.windows
    }

    /// Forward transform of a real signal. Shorter input is zero-padded,
    /// longer input is truncated to the transform size.
    pub fn forward(&self, samples: &[f32]) -> Spectrum {
        let mut spectrum = Spectrum::zeros(self.size);
        let n = samples.len().min(self.size);
        spectrum.real[..n].copy_from_slice(&samples[..n]);
        self.transform(&mut spectrum.real, &mut spectrum.imag, false);
        spectrum
    }

    /// Inverse transform, returning the real part scaled by `1 / size`.
    pub fn inverse(&self, real: &[f32], imag: &[f32]) -> Vec<f32> {
        let mut re = vec![0.0f32; self.size];
        let mut im = vec![0.0f32; self.size];
        let n = real.len().min(self.size);
        re[..n].copy_from_slice(&real[..n]);
        let n = imag.len().min(self.size);
        im[..n].copy_from_slice(&imag[..n]);

        self.transform(&mut re, &mut im, true);

        let scale = 1.0 / self.size as f32;
        re.iter_mut().for_each(|x| *x *= scale);
        re
    }

    fn transform(&self, re: &mut [f32], im: &mut [f32], inverse: bool) {
        let n = self.size;

        for i in 0..n {
            let j = self.bit_reverse[i];
            if j > i {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let t = k * step;
                    let wr = self.cos_table[t];
                    let wi = if inverse {
                        self.sin_table[t]
                    } else {
                        -self.sin_table[t]
                    };

                    let a = start + k;
                    let b = a + half;
                    let xr = re[b] * wr - im[b] * wi;
                    let xi = re[b] * wi + im[b] * wr;
                    re[b] = re[a] - xr;
                    im[b] = im[a] - xi;
                    re[a] += xr;
                    im[a] += xi;
                }
            }
            len <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        for size in [0, 3, 6, 12, 1000] {
            assert!(matches!(Fft::new(size), Err(EngineError::InvalidSize(s)) if s == size));
        }
        assert!(Fft::new(1).is_ok());
        assert!(Fft::new(1024).is_ok());
    }

    #[test]
    fn impulse_gives_flat_spectrum() {
        let fft = Fft::new(8).unwrap();
        let impulse = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let spectrum = fft.forward(&impulse);

        for i in 0..8 {
            assert!((spectrum.real[i] - 1.0).abs() < 1e-6, "real[{}] = {}", i, spectrum.real[i]);
            assert!(spectrum.imag[i].abs() < 1e-6, "imag[{}] = {}", i, spectrum.imag[i]);
        }

        let restored = fft.inverse(&spectrum.real, &spectrum.imag);
        for (a, b) in restored.iter().zip(impulse.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn round_trip_recovers_signal() {
        for size in [2, 16, 256, 2048] {
            let fft = Fft::new(size).unwrap();
            let signal: Vec<f32> = (0..size)
                .map(|n| {
                    let t = n as f32;
                    (0.05 * t).sin() * 0.7 + (0.31 * t).cos() * 0.2 - 0.05
                })
                .collect();

            let spectrum = fft.forward(&signal);
            let restored = fft.inverse(&spectrum.real, &spectrum.imag);

            let max_err = restored
                .iter()
                .zip(signal.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f32, f32::max);
            assert!(max_err < 1e-4, "size {}: max error {}", size, max_err);
        }
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 1024;
        let fft = Fft::new(size).unwrap();
        let bin = 37;
        let signal: Vec<f32> = (0..size)
            .map(|n| (2.0 * std::f32::consts::PI * bin as f32 * n as f32 / size as f32).sin())
            .collect();

        let magnitude = fft.forward(&signal).magnitude();
        let (peak, &peak_mag) = magnitude
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .unwrap();

        assert_eq!(peak, bin);
        assert!((peak_mag - size as f32 / 2.0).abs() < 0.5);
    }

    #[test]
    fn short_input_is_zero_padded() {
        let fft = Fft::new(8).unwrap();
        let padded = fft.forward(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let short = fft.forward(&[1.0, 2.0, 3.0]);
        assert_eq!(padded, short);
    }
}
