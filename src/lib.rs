//! Spectral audio engine: FFT primitives with runtime backend dispatch,
//! noise-profile learning, spectral-subtraction noise reduction, quiet
//! segment detection, beat detection and PCM WAV encoding.

pub mod audio;
pub mod backend;
pub mod beat;
pub mod encode;
pub mod error;
pub mod fft;
pub mod noise;

pub use audio::AudioBuffer;
pub use backend::{BackendConfig, BackendRegistry, BackendReport, BackendStatus, BitDepth, FftKernel};
pub use beat::{BeatDetector, BeatDetectorConfig, BeatEnergySeries};
pub use error::{EngineError, Result};
pub use fft::{Fft, Spectrum};
pub use noise::{NoiseProfile, NoiseReducer, NoiseReductionConfig, NoiseSegment, SegmentDetectorConfig};
