//! Statistical fingerprint of a noise-only recording.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::backend::FftKernel;
use crate::error::{EngineError, Result};

/// Per-bin magnitude statistics of a noise sample, up to Nyquist.
///
/// Immutable once learned. The sample rate and transform size travel with
/// the statistics so a reducer can tell when it must reconfigure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseProfile {
    frequencies: Vec<f32>,
    magnitudes: Vec<f32>,
    standard_deviations: Vec<f32>,
    sample_rate: u32,
    fft_size: usize,
}

impl NoiseProfile {
    pub fn from_parts(
        magnitudes: Vec<f32>,
        standard_deviations: Vec<f32>,
        sample_rate: u32,
        fft_size: usize,
    ) -> Result<Self> {
        let profile = Self {
            frequencies: bin_frequencies(fft_size, sample_rate),
            magnitudes,
            standard_deviations,
            sample_rate,
            fft_size,
        };
        profile.check()?;
        Ok(profile)
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    /// Mean magnitude per bin.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn standard_deviations(&self) -> &[f32] {
        &self.standard_deviations
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn num_bins(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.check()?;
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved noise profile to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let profile = Self::from_json(&json)?;
        log::info!(
            "Loaded noise profile from {} (fft={}, {}Hz)",
            path.display(),
            profile.fft_size,
            profile.sample_rate
        );
        Ok(profile)
    }

    fn check(&self) -> Result<()> {
        if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
            return Err(EngineError::InvalidSize(self.fft_size));
        }
        let bins = self.fft_size / 2;
        if self.magnitudes.len() != bins
            || self.standard_deviations.len() != bins
            || self.frequencies.len() != bins
        {
            return Err(EngineError::ProfileFormat(serde::de::Error::custom(format!(
                "expected {} bins for fft size {}, got {} magnitudes, {} deviations, {} frequencies",
                bins,
                self.fft_size,
                self.magnitudes.len(),
                self.standard_deviations.len(),
                self.frequencies.len()
            ))));
        }
        Ok(())
    }
}

/// Center frequency in Hz of each bin below Nyquist.
pub fn bin_frequencies(fft_size: usize, sample_rate: u32) -> Vec<f32> {
    let resolution = sample_rate as f32 / fft_size.max(1) as f32;
    (0..fft_size / 2).map(|k| k as f32 * resolution).collect()
}

/// Learn a noise profile from a noise-only buffer.
///
/// Frames of `fft.size()` samples at a hop of a quarter frame are windowed
/// and transformed; every channel feeds the same per-bin accumulators.
pub fn learn_noise_profile(buffer: &AudioBuffer, fft: &dyn FftKernel) -> Result<NoiseProfile> {
    let size = fft.size();
    if size < 4 {
        return Err(EngineError::InvalidSize(size));
    }
    let len = buffer.len();
    if len < size {
        return Err(EngineError::InsufficientSample {
            samples: len,
            required: size,
        });
    }

    let hop = size / 4;
    let bins = size / 2;
    let mut sum = vec![0.0f64; bins];
    let mut sum_sq = vec![0.0f64; bins];
    let mut num_frames = 0usize;
    let mut frame = vec![0.0f32; size];

    for channel in &buffer.channels {
        let mut pos = 0;
        while pos + size <= len {
            frame.copy_from_slice(&channel[pos..pos + size]);
            fft.apply_analysis_window(&mut frame);
            let magnitude = fft.forward(&frame).magnitude();

            for (k, &m) in magnitude.iter().enumerate() {
                let m = m as f64;
                sum[k] += m;
                sum_sq[k] += m * m;
            }
            num_frames += 1;
            pos += hop;
        }
    }

    let n = num_frames as f64;
    let (magnitudes, standard_deviations): (Vec<f32>, Vec<f32>) = sum
        .iter()
        .zip(&sum_sq)
        .map(|(&s, &sq)| {
            let mean = s / n;
            let variance = (sq / n - mean * mean).max(0.0);
            (mean as f32, variance.sqrt() as f32)
        })
        .unzip();

    log::info!(
        "Learned noise profile: {} frames, {} bins, fft={}, {}Hz",
        num_frames,
        bins,
        size,
        buffer.sample_rate
    );

    NoiseProfile::from_parts(magnitudes, standard_deviations, buffer.sample_rate, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::Fft;

    fn hiss(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 0.2 - 0.1
            })
            .collect()
    }

    #[test]
    fn profile_has_half_size_bins() {
        let fft = Fft::new(512).unwrap();
        let buffer = AudioBuffer::mono(hiss(8000, 1), 16000);
        let profile = learn_noise_profile(&buffer, &fft).unwrap();

        assert_eq!(profile.magnitudes().len(), 256);
        assert_eq!(profile.standard_deviations().len(), 256);
        assert_eq!(profile.frequencies().len(), 256);
        assert_eq!(profile.fft_size(), 512);
        assert_eq!(profile.sample_rate(), 16000);
        assert!((profile.frequencies()[1] - 31.25).abs() < 1e-4);
        assert!(profile.standard_deviations().iter().all(|&s| s >= 0.0));
        assert!(profile.magnitudes().iter().skip(1).all(|&m| m > 0.0));
    }

    #[test]
    fn constant_tone_has_near_zero_deviation() {
        let size = 256;
        let fft = Fft::new(size).unwrap();
        // Period divides the hop, so every frame sees the same waveform.
        let samples: Vec<f32> = (0..4096)
            .map(|n| (2.0 * std::f32::consts::PI * (n % 16) as f32 / 16.0).sin() * 0.5)
            .collect();
        let profile = learn_noise_profile(&AudioBuffer::mono(samples, 8000), &fft).unwrap();

        let peak = size / 16;
        assert!(profile.magnitudes()[peak] > 10.0);
        assert!(profile.standard_deviations()[peak] < 1e-2 * profile.magnitudes()[peak]);
    }

    #[test]
    fn short_sample_is_rejected() {
        let fft = Fft::new(1024).unwrap();
        let buffer = AudioBuffer::mono(vec![0.0; 1000], 44100);
        match learn_noise_profile(&buffer, &fft) {
            Err(EngineError::InsufficientSample { samples, required }) => {
                assert_eq!(samples, 1000);
                assert_eq!(required, 1024);
            }
            other => panic!("expected InsufficientSample, got {:?}", other),
        }
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let fft = Fft::new(256).unwrap();
        let buffer = AudioBuffer::new(vec![hiss(3000, 7), hiss(3000, 9)], 22050);
        let profile = learn_noise_profile(&buffer, &fft).unwrap();

        let json = profile.to_json().unwrap();
        assert!(json.contains("standardDeviations"));
        assert!(json.contains("fftSize"));
        let restored = NoiseProfile::from_json(&json).unwrap();
        assert_eq!(restored, profile);

        let path = std::env::temp_dir().join(format!("noise-profile-{}.json", std::process::id()));
        profile.save(&path).unwrap();
        let loaded = NoiseProfile::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn inconsistent_json_is_rejected() {
        let json = r#"{"frequencies":[0.0],"magnitudes":[1.0],"standardDeviations":[0.1],"sampleRate":8000,"fftSize":1024}"#;
        assert!(matches!(
            NoiseProfile::from_json(json),
            Err(EngineError::ProfileFormat(_))
        ));
    }
}
