//! Spectral-subtraction noise reduction over a 75%-overlap STFT.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Deserialize;

use super::profile::{learn_noise_profile, NoiseProfile};
use super::segments::{longest_noise_segment, NoiseSegment, SegmentDetectorConfig};
use crate::audio::AudioBuffer;
use crate::backend::{BackendRegistry, FftKernel};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NoiseReductionConfig {
    /// Spectral floor level in dB relative to the noise mean
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Over-subtraction strength, 0-1
    #[serde(default = "default_reduction")]
    pub reduction: f32,
    /// Reserved (ms); not applied by the subtraction stage
    #[serde(default = "default_attack")]
    pub attack: f32,
    /// Reserved (ms); not applied by the subtraction stage
    #[serde(default = "default_release")]
    pub release: f32,
    /// Share of the original magnitude mixed back in, 0-1
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            reduction: default_reduction(),
            attack: default_attack(),
            release: default_release(),
            smoothing: default_smoothing(),
            fft_size: default_fft_size(),
        }
    }
}

fn default_threshold() -> f32 { -20.0 }
fn default_reduction() -> f32 { 0.5 }
fn default_attack() -> f32 { 10.0 }
fn default_release() -> f32 { 100.0 }
fn default_smoothing() -> f32 { 0.1 }
fn default_fft_size() -> usize { 2048 }

/// Per-bin subtraction terms derived from a profile and a config.
#[derive(Debug, Clone)]
pub struct SpectralGate {
    subtract: Vec<f32>,
    floor: Vec<f32>,
    smoothing: f32,
}

impl SpectralGate {
    pub fn new(profile: &NoiseProfile, config: &NoiseReductionConfig) -> Self {
        let reduction = config.reduction.clamp(0.0, 1.0);
        let floor_gain = (1.0 - reduction) * 10f32.powf(config.threshold / 20.0);

        let subtract = profile
            .magnitudes()
            .iter()
            .zip(profile.standard_deviations())
            .map(|(mean, std)| (1.0 + reduction) * (mean + std))
            .collect();
        let floor = profile.magnitudes().iter().map(|mean| mean * floor_gain).collect();

        Self {
            subtract,
            floor,
            smoothing: config.smoothing.clamp(0.0, 1.0),
        }
    }

    /// Subtract, clamp to the floor, then blend back toward the original.
    pub fn apply(&self, magnitude: &[f32]) -> Vec<f32> {
        magnitude
            .iter()
            .zip(self.subtract.iter().zip(&self.floor))
            .map(|(&m, (&sub, &floor))| {
                let gated = (m - sub).max(floor);
                gated * (1.0 - self.smoothing) + m * self.smoothing
            })
            .collect()
    }
}

/// Removes stationary noise described by a [`NoiseProfile`].
pub struct NoiseReducer {
    registry: Arc<BackendRegistry>,
    config: NoiseReductionConfig,
    kernel: Arc<dyn FftKernel>,
    profile: Option<NoiseProfile>,
}

impl NoiseReducer {
    pub fn new(registry: Arc<BackendRegistry>, config: NoiseReductionConfig) -> Result<Self> {
        let kernel = stft_kernel(&registry, config.fft_size)?;
        Ok(Self {
            registry,
            config,
            kernel,
            profile: None,
        })
    }

    pub fn config(&self) -> &NoiseReductionConfig {
        &self.config
    }

    pub fn fft_size(&self) -> usize {
        self.kernel.size()
    }

    pub fn profile(&self) -> Option<&NoiseProfile> {
        self.profile.as_ref()
    }

    /// Replace the configuration. An assigned profile pins the transform
    /// size, so a conflicting `fft_size` is overridden by the profile's.
    pub fn set_config(&mut self, mut config: NoiseReductionConfig) -> Result<()> {
        if let Some(profile) = &self.profile {
            if profile.fft_size() != config.fft_size {
                log::warn!(
                    "Keeping fft size {} of the assigned noise profile (requested {})",
                    profile.fft_size(),
                    config.fft_size
                );
                config.fft_size = profile.fft_size();
            }
        }
        if config.fft_size != self.fft_size() {
            self.kernel = stft_kernel(&self.registry, config.fft_size)?;
        }
        self.config = config;
        Ok(())
    }

    /// Assign a profile, switching the transform size to the profile's when
    /// they differ.
    pub fn set_profile(&mut self, profile: NoiseProfile) -> Result<()> {
        if profile.fft_size() != self.fft_size() {
            log::info!(
                "Reconfiguring noise reducer: fft size {} -> {}",
                self.fft_size(),
                profile.fft_size()
            );
            self.kernel = stft_kernel(&self.registry, profile.fft_size())?;
            self.config.fft_size = profile.fft_size();
        }
        self.profile = Some(profile);
        Ok(())
    }

    pub fn clear_profile(&mut self) {
        self.profile = None;
    }

    /// Learn a profile from a noise-only buffer and assign it.
    pub fn learn_profile(&mut self, noise: &AudioBuffer) -> Result<&NoiseProfile> {
        let profile = learn_noise_profile(noise, self.kernel.as_ref())?;
        Ok(self.profile.insert(profile))
    }

    /// Learn a profile from the longest quiet segment of `buffer`. Returns
    /// `Ok(None)`, leaving any existing profile in place, when the buffer
    /// has no quiet segment.
    pub fn learn_profile_auto(
        &mut self,
        buffer: &AudioBuffer,
        detector: &SegmentDetectorConfig,
    ) -> Result<Option<NoiseSegment>> {
        let Some(segment) = longest_noise_segment(buffer, detector) else {
            log::warn!("No quiet segment found for automatic noise profiling");
            return Ok(None);
        };
        log::info!(
            "Using quiet segment {:.2}s - {:.2}s as noise sample",
            segment.start_time,
            segment.end_time
        );
        self.learn_profile(&buffer.slice(segment.start, segment.end))?;
        Ok(Some(segment))
    }

    /// Denoise every channel of `buffer`. Output channels have the same
    /// length as the input channels.
    pub fn process_buffer(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        let profile = self.profile.as_ref().ok_or(EngineError::MissingProfile)?;
        if profile.sample_rate() != buffer.sample_rate {
            log::warn!(
                "Noise profile was learned at {}Hz, buffer is {}Hz",
                profile.sample_rate(),
                buffer.sample_rate
            );
        }

        log::info!(
            "Reducing noise: {} channel(s), fft={}, reduction={:.2}, threshold={:.1}dB, smoothing={:.2}",
            buffer.num_channels(),
            self.fft_size(),
            self.config.reduction,
            self.config.threshold,
            self.config.smoothing
        );

        let gate = SpectralGate::new(profile, &self.config);
        let kernel = self.kernel.as_ref();
        let channels = buffer
            .channels
            .par_iter()
            .map(|channel| process_channel(kernel, &gate, channel))
            .collect();

        Ok(AudioBuffer::new(channels, buffer.sample_rate))
    }
}

fn stft_kernel(registry: &BackendRegistry, size: usize) -> Result<Arc<dyn FftKernel>> {
    // A quarter-frame hop needs at least four samples per frame.
    if size < 4 {
        return Err(EngineError::InvalidSize(size));
    }
    registry.fft().kernel(size)
}

fn nyquist_gain(magnitude: &[f32], processed: &[f32]) -> f32 {
    match (magnitude.last(), processed.last()) {
        (Some(&m), Some(&p)) if m > 0.0 => p / m,
        _ => 1.0,
    }
}

fn process_channel(kernel: &dyn FftKernel, gate: &SpectralGate, samples: &[f32]) -> Vec<f32> {
    let len = samples.len();
    if len == 0 {
        return Vec::new();
    }

    let size = kernel.size();
    let hop = size / 4;
    let overlap = (size / hop) as f32;
    let nyquist = size / 2;

    // Leading padding puts the same number of frames over every sample.
    let lead = size - hop;
    let mut padded = vec![0.0f32; lead + len + size];
    padded[lead..lead + len].copy_from_slice(samples);
    let mut accum = vec![0.0f32; padded.len()];
    let mut frame = vec![0.0f32; size];

    let mut pos = 0;
    let mut frames = 0usize;
    while pos < lead + len {
        frame.copy_from_slice(&padded[pos..pos + size]);
        kernel.apply_analysis_window(&mut frame);

        let original = kernel.forward(&frame);
        let (magnitude, phase) = original.magnitude_and_phase();
        let processed = gate.apply(&magnitude);

        let mut spectrum = kernel.from_magnitude_and_phase(&processed, &phase);
        // The half spectrum stops below Nyquist; carry that bin over with the
        // gain of the highest gated bin.
        let gain = nyquist_gain(&magnitude, &processed);
        spectrum.real[nyquist] = original.real[nyquist] * gain;
        spectrum.imag[nyquist] = original.imag[nyquist] * gain;
        let mut resynth = kernel.inverse(&spectrum.real, &spectrum.imag);
        kernel.apply_synthesis_window(&mut resynth);

        for (acc, s) in accum[pos..pos + size].iter_mut().zip(&resynth) {
            *acc += s;
        }
        pos += hop;
        frames += 1;
    }
    log::debug!("Processed {} frames of {} samples", frames, size);

    accum[lead..lead + len].iter().map(|s| s / overlap).collect()
}
