//! Energy-envelope onset detection and tempo estimation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::backend::BackendRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BeatDetectorConfig {
    /// RMS analysis window
    #[serde(default = "default_window_ms")]
    pub window_ms: f32,
    /// Moving-average width (in windows) of the envelope used for the threshold
    #[serde(default = "default_smoothing_windows")]
    pub smoothing_windows: usize,
    /// Standard deviations above the median an onset must reach
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: f32,
}

impl Default for BeatDetectorConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            smoothing_windows: default_smoothing_windows(),
            sensitivity: default_sensitivity(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

fn default_window_ms() -> f32 { 10.0 }
fn default_smoothing_windows() -> usize { 3 }
fn default_sensitivity() -> f32 { 1.5 }
fn default_min_interval_ms() -> f32 { 100.0 }

/// Everything the detector computed for one buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeatEnergySeries {
    pub energy: Vec<f32>,
    pub smoothed: Vec<f32>,
    pub median: f32,
    pub mean: f32,
    pub std_dev: f32,
    pub threshold: f32,
    /// Accepted peak indices into `energy`, ascending
    pub peaks: Vec<usize>,
    /// Samples per analysis window
    pub window_size: usize,
    pub sample_rate: u32,
}

impl BeatEnergySeries {
    pub fn window_duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.window_size as f32 / self.sample_rate as f32
    }

    /// Onset timestamps in seconds.
    pub fn onset_times(&self) -> Vec<f32> {
        let step = self.window_duration();
        self.peaks.iter().map(|&i| i as f32 * step).collect()
    }

    pub fn tempo_bpm(&self) -> f32 {
        estimate_tempo(&self.onset_times())
    }
}

pub struct BeatDetector {
    registry: Arc<BackendRegistry>,
    config: BeatDetectorConfig,
}

impl BeatDetector {
    pub fn new(registry: Arc<BackendRegistry>, config: BeatDetectorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &BeatDetectorConfig {
        &self.config
    }

    pub fn analyze(&self, buffer: &AudioBuffer) -> BeatEnergySeries {
        let kernel = self.registry.beat().kernel();
        let sample_rate = buffer.sample_rate;
        let sr = sample_rate.max(1) as f32;

        let window_size = ((self.config.window_ms / 1000.0 * sr).round() as usize).max(1);
        let window_seconds = window_size as f32 / sr;
        let min_distance = ((self.config.min_interval_ms / 1000.0 / window_seconds).round() as usize).max(1);

        let mono = buffer.mixdown();
        let energy = kernel.rms_energy(&mono, window_size);
        let smoothed = kernel.moving_average(&energy, self.config.smoothing_windows);
        let median = kernel.median(&smoothed);
        let (mean, std_dev) = kernel.mean_std(&smoothed);
        let threshold = median + self.config.sensitivity * std_dev;
        let peaks = kernel.pick_peaks(&energy, threshold, min_distance);

        log::info!(
            "Beat analysis ({}): {} windows of {} samples, threshold={:.4}, {} onset(s)",
            kernel.name(),
            energy.len(),
            window_size,
            threshold,
            peaks.len()
        );

        BeatEnergySeries {
            energy,
            smoothed,
            median,
            mean,
            std_dev,
            threshold,
            peaks,
            window_size,
            sample_rate,
        }
    }

    /// Onset timestamps in seconds.
    pub fn detect(&self, buffer: &AudioBuffer) -> Vec<f32> {
        self.analyze(buffer).onset_times()
    }
}

/// BPM from the median inter-onset interval, keeping only intervals in the
/// 60-200 BPM range. Falls back to 120.
pub fn estimate_tempo(onset_times: &[f32]) -> f32 {
    if onset_times.len() < 2 {
        return 120.0;
    }

    let mut reasonable: Vec<f32> = onset_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return 120.0;
    }

    reasonable.sort_by(|a, b| a.total_cmp(b));
    60.0 / reasonable[reasonable.len() / 2]
}
