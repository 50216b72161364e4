//! Locate quiet stretches of a recording to use as implicit noise samples.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SegmentDetectorConfig {
    /// RMS analysis window
    #[serde(default = "default_window_ms")]
    pub window_ms: f32,
    /// Windows whose RMS level falls below this are quiet
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f32,
    /// Quiet runs shorter than this are dropped
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: f32,
}

impl Default for SegmentDetectorConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            threshold_db: default_threshold_db(),
            min_duration_ms: default_min_duration_ms(),
        }
    }
}

fn default_window_ms() -> f32 { 50.0 }
fn default_threshold_db() -> f32 { -40.0 }
fn default_min_duration_ms() -> f32 { 500.0 }

/// A run of quiet windows, as a half-open sample range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseSegment {
    pub start: usize,
    pub end: usize,
    pub start_time: f32,
    pub end_time: f32,
}

impl NoiseSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn duration(&self) -> f32 {
        self.end_time - self.start_time
    }
}

/// RMS level of a window in dB across every channel.
fn window_level_db(buffer: &AudioBuffer, start: usize, end: usize) -> f32 {
    let count = (end - start) * buffer.num_channels();
    if count == 0 {
        return f32::NEG_INFINITY;
    }
    let energy: f32 = buffer
        .channels
        .iter()
        .map(|ch| ch[start..end].iter().map(|s| s * s).sum::<f32>())
        .sum();
    let rms = (energy / count as f32).sqrt();
    20.0 * (rms + 1e-10).log10()
}

pub fn detect_noise_segments(buffer: &AudioBuffer, config: &SegmentDetectorConfig) -> Vec<NoiseSegment> {
    let len = buffer.len();
    let sample_rate = buffer.sample_rate.max(1) as f32;
    let window = ((config.window_ms / 1000.0 * sample_rate).round() as usize).max(1);
    let min_len = (config.min_duration_ms / 1000.0 * sample_rate).round() as usize;

    let to_segment = |start: usize, end: usize| NoiseSegment {
        start,
        end,
        start_time: start as f32 / sample_rate,
        end_time: end as f32 / sample_rate,
    };

    let mut segments = Vec::new();
    let mut run_start: Option<usize> = None;

    for start in (0..len).step_by(window) {
        let end = (start + window).min(len);
        let quiet = window_level_db(buffer, start, end) < config.threshold_db;

        match (quiet, run_start) {
            (true, None) => run_start = Some(start),
            (false, Some(begin)) => {
                if start - begin >= min_len {
                    segments.push(to_segment(begin, start));
                }
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = run_start {
        if len - begin >= min_len {
            segments.push(to_segment(begin, len));
        }
    }

    log::debug!(
        "Segment scan: {} quiet segment(s) below {:.1} dB ({} sample windows)",
        segments.len(),
        config.threshold_db,
        window
    );
    segments
}

/// Longest quiet segment, the default pick for an implicit noise sample.
pub fn longest_noise_segment(buffer: &AudioBuffer, config: &SegmentDetectorConfig) -> Option<NoiseSegment> {
    detect_noise_segments(buffer, config)
        .into_iter()
        .max_by_key(NoiseSegment::len)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn tone(seconds: f32, amplitude: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SR as f32).sin())
            .collect()
    }

    fn concat(parts: &[Vec<f32>]) -> Vec<f32> {
        parts.iter().flatten().copied().collect()
    }

    #[test]
    fn finds_single_two_second_gap() {
        let samples = concat(&[tone(1.0, 0.5), vec![0.0; 2 * SR as usize], tone(1.0, 0.5)]);
        let buffer = AudioBuffer::mono(samples, SR);

        let segments = detect_noise_segments(&buffer, &SegmentDetectorConfig::default());
        assert_eq!(segments.len(), 1);
        assert!((segments[0].duration() - 2.0).abs() < 0.06);
        assert!((segments[0].start_time - 1.0).abs() < 0.06);
    }

    #[test]
    fn short_gaps_are_dropped() {
        let samples = concat(&[
            tone(0.5, 0.5),
            vec![0.0; SR as usize / 5],
            tone(0.5, 0.5),
            vec![0.0; SR as usize],
            tone(0.5, 0.5),
        ]);
        let buffer = AudioBuffer::mono(samples, SR);

        let segments = detect_noise_segments(&buffer, &SegmentDetectorConfig::default());
        assert_eq!(segments.len(), 1);
        assert!((segments[0].duration() - 1.0).abs() < 0.06);
    }

    #[test]
    fn longest_segment_wins_and_trailing_run_counts() {
        let samples = concat(&[
            vec![0.0; SR as usize],
            tone(0.5, 0.5),
            vec![0.0; 3 * SR as usize / 2],
        ]);
        let buffer = AudioBuffer::new(vec![samples.clone(), samples], SR);

        let segments = detect_noise_segments(&buffer, &SegmentDetectorConfig::default());
        assert_eq!(segments.len(), 2);

        let longest = longest_noise_segment(&buffer, &SegmentDetectorConfig::default()).unwrap();
        assert_eq!(longest.end, buffer.len());
        assert!((longest.duration() - 1.5).abs() < 0.06);
    }

    #[test]
    fn loud_buffer_has_no_segments() {
        let buffer = AudioBuffer::mono(tone(2.0, 0.5), SR);
        assert!(longest_noise_segment(&buffer, &SegmentDetectorConfig::default()).is_none());
    }
}
