pub mod profile;
pub mod reducer;
pub mod segments;

pub use profile::{bin_frequencies, learn_noise_profile, NoiseProfile};
pub use reducer::{NoiseReducer, NoiseReductionConfig, SpectralGate};
pub use segments::{detect_noise_segments, longest_noise_segment, NoiseSegment, SegmentDetectorConfig};
