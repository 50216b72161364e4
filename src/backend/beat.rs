//! Beat-energy statistics kernels.

use std::sync::Arc;

use rayon::prelude::*;

use super::slot::LoadError;
use super::{accelerated_allowed, BackendConfig};

pub trait BeatKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// RMS of consecutive non-overlapping windows; a trailing partial window
    /// is measured over the samples it has.
    fn rms_energy(&self, samples: &[f32], window: usize) -> Vec<f32>;

    /// Centered moving average over `width` values, shrinking at the edges.
    fn moving_average(&self, values: &[f32], width: usize) -> Vec<f32>;

    fn median(&self, values: &[f32]) -> f32;

    /// Mean and population standard deviation.
    fn mean_std(&self, values: &[f32]) -> (f32, f32);

    /// Interior strict local maxima above `threshold`, each at least
    /// `min_distance` indices after the previously accepted one.
    fn pick_peaks(&self, energy: &[f32], threshold: f32, min_distance: usize) -> Vec<usize>;
}

fn window_rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt()
}

fn is_candidate(energy: &[f32], i: usize, threshold: f32) -> bool {
    energy[i] > energy[i - 1] && energy[i] > energy[i + 1] && energy[i] > threshold
}

// Single pass: the cursor only moves forward, so a rejected candidate never
// suppresses a later one.
fn accept_spaced(candidates: impl IntoIterator<Item = usize>, min_distance: usize) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;
    for i in candidates {
        if last.map_or(true, |prev| i - prev >= min_distance) {
            peaks.push(i);
            last = Some(i);
        }
    }
    peaks
}

#[derive(Debug, Default)]
pub struct ReferenceBeatKernel;

impl BeatKernel for ReferenceBeatKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn rms_energy(&self, samples: &[f32], window: usize) -> Vec<f32> {
        if window == 0 {
            return Vec::new();
        }
        samples.chunks(window).map(window_rms).collect()
    }

    fn moving_average(&self, values: &[f32], width: usize) -> Vec<f32> {
        if width <= 1 {
            return values.to_vec();
        }
        let radius = width / 2;
        (0..values.len())
            .map(|i| {
                let lo = i.saturating_sub(radius);
                let hi = (i + radius + 1).min(values.len());
                values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
            })
            .collect()
    }

    fn median(&self, values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    fn mean_std(&self, values: &[f32]) -> (f32, f32) {
        if values.is_empty() {
            return (0.0, 0.0);
        }
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        (mean, variance.max(0.0).sqrt())
    }

    fn pick_peaks(&self, energy: &[f32], threshold: f32, min_distance: usize) -> Vec<usize> {
        if energy.len() < 3 {
            return Vec::new();
        }
        let candidates = (1..energy.len() - 1).filter(|&i| is_candidate(energy, i, threshold));
        accept_spaced(candidates, min_distance)
    }
}

/// Parallel RMS, prefix-sum smoothing, selection-based median and a single
/// f64 pass for the moments.
#[derive(Debug, Default)]
pub struct ParallelBeatKernel;

impl BeatKernel for ParallelBeatKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn rms_energy(&self, samples: &[f32], window: usize) -> Vec<f32> {
        if window == 0 {
            return Vec::new();
        }
        samples.par_chunks(window).map(window_rms).collect()
    }

    fn moving_average(&self, values: &[f32], width: usize) -> Vec<f32> {
        if width <= 1 {
            return values.to_vec();
        }
        let mut prefix = Vec::with_capacity(values.len() + 1);
        prefix.push(0.0f64);
        let mut acc = 0.0f64;
        for &v in values {
            acc += v as f64;
            prefix.push(acc);
        }

        let radius = width / 2;
        (0..values.len())
            .map(|i| {
                let lo = i.saturating_sub(radius);
                let hi = (i + radius + 1).min(values.len());
                ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32
            })
            .collect()
    }

    fn median(&self, values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        let mut scratch = values.to_vec();
        let mid = scratch.len() / 2;
        let (lower, &mut upper, _) = scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        if values.len() % 2 == 0 {
            let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            (below + upper) / 2.0
        } else {
            upper
        }
    }

    fn mean_std(&self, values: &[f32]) -> (f32, f32) {
        if values.is_empty() {
            return (0.0, 0.0);
        }
        let (sum, sum_sq) = values
            .par_iter()
            .map(|&v| (v as f64, v as f64 * v as f64))
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

        let n = values.len() as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        (mean as f32, variance.sqrt() as f32)
    }

    fn pick_peaks(&self, energy: &[f32], threshold: f32, min_distance: usize) -> Vec<usize> {
        if energy.len() < 3 {
            return Vec::new();
        }
        let candidates: Vec<usize> = (1..energy.len() - 1)
            .into_par_iter()
            .filter(|&i| is_candidate(energy, i, threshold))
            .collect();
        accept_spaced(candidates, min_distance)
    }
}

pub fn load_parallel_kernel(config: &BackendConfig) -> Result<Arc<dyn BeatKernel>, LoadError> {
    accelerated_allowed(config)?;

    let probe: Vec<f32> = (0..2000)
        .map(|n| ((n as f32 * 0.37).sin() * (n as f32 * 0.011).cos()).abs())
        .collect();
    let reference = ReferenceBeatKernel;
    let parallel = ParallelBeatKernel;

    let (ref_mean, ref_std) = reference.mean_std(&probe);
    let (par_mean, par_std) = parallel.mean_std(&probe);
    let max_error = [
        (reference.median(&probe) - parallel.median(&probe)).abs(),
        (ref_mean - par_mean).abs(),
        (ref_std - par_std).abs(),
    ]
    .into_iter()
    .fold(0.0f32, f32::max) as f64;

    let same_peaks = reference.pick_peaks(&probe, 0.5, 5) == parallel.pick_peaks(&probe, 0.5, 5);
    if max_error > 1e-4 || !same_peaks {
        return Err(LoadError::SelfCheckFailed { max_error });
    }
    Ok(Arc::new(ParallelBeatKernel))
}
