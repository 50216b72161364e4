//! Hann windows for the analysis and synthesis halves of an STFT.

/// Periodic Hann window: w[n] = 0.5 - 0.5 * cos(2πn / N).
///
/// The periodic form (denominator N, not N - 1) makes shifted copies at a
/// hop of N/4 sum to a constant, which overlap-add relies on.
pub fn hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let angle = 2.0 * std::f64::consts::PI * n as f64 / size as f64;
            (0.5 - 0.5 * angle.cos()) as f32
        })
        .collect()
}

/// Multiply a frame by a window in place.
pub fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (s, w) in frame.iter_mut().zip(window) {
        *s *= w;
    }
}

/// Analysis/synthesis window pair for one transform size.
#[derive(Debug, Clone)]
pub struct Windows {
    analysis: Vec<f32>,
    synthesis: Vec<f32>,
}

impl Windows {
    /// Hann analysis window; the synthesis window is the same Hann scaled by
    /// `N / Σ w²`, so summing analysis·synthesis over the four frames that
    /// cover any sample at 75% overlap gives exactly the overlap factor.
    pub fn hann(size: usize) -> Self {
        let analysis = hann(size);
        let energy: f64 = analysis.iter().map(|&w| (w as f64) * (w as f64)).sum();
        let gain = if energy > 0.0 {
            (size as f64 / energy) as f32
        } else {
            1.0
        };
        let synthesis = analysis.iter().map(|&w| w * gain).collect();

        Self {
            analysis,
            synthesis,
        }
    }

    pub fn analysis(&self) -> &[f32] {
        &self.analysis
    }

    pub fn synthesis(&self) -> &[f32] {
        &self.synthesis
    }

    pub fn apply_analysis(&self, frame: &mut [f32]) {
        apply_window(frame, &self.analysis);
    }

    pub fn apply_synthesis(&self, frame: &mut [f32]) {
        apply_window(frame, &self.synthesis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_shape() {
        let w = hann(16);
        assert_eq!(w.len(), 16);
        assert!(w[0].abs() < 1e-7);
        assert!((w[8] - 1.0).abs() < 1e-6);
        // Periodic: symmetric around N/2, not around (N-1)/2
        assert!((w[1] - w[15]).abs() < 1e-6);
    }

    #[test]
    fn overlap_add_sums_to_overlap_factor() {
        let size = 64;
        let hop = size / 4;
        let windows = Windows::hann(size);

        for n in 0..hop {
            let total: f32 = (0..4)
                .map(|k| {
                    let i = n + k * hop;
                    windows.analysis()[i] * windows.synthesis()[i]
                })
                .sum();
            assert!((total - 4.0).abs() < 1e-4, "offset {}: {}", n, total);
        }
    }
}
