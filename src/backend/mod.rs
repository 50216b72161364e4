//! Runtime backend dispatch.
//!
//! Every numerically heavy kernel family (FFT, PCM quantization, beat
//! statistics) ships a portable reference implementation and an optional
//! accelerated module behind one trait. The accelerated module is loaded once,
//! on first use or on [`BackendRegistry::preload`]; if loading fails for any
//! reason the family stays on the reference path for the registry's lifetime.
//! Callers never see the difference except through [`BackendRegistry::report`].
//!
//! ```text
//!   NoiseReducer / BeatDetector / encode_wav
//!                    │
//!                    ▼
//!            BackendRegistry
//!   ┌──────────────┬──────────────┬──────────────┐
//!   │ FftDispatcher│ PcmDispatcher│ BeatDispatcher│
//!   └──────┬───────┴──────┬───────┴──────┬───────┘
//!     accelerated slot (lazy, once)  ──or──  reference
//! ```

pub mod beat;
pub mod fft;
pub mod pcm;
pub mod slot;

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Deserialize;

pub use beat::{BeatKernel, ParallelBeatKernel, ReferenceBeatKernel};
pub use fft::{FftDispatcher, FftKernel, PlannedFftModule};
pub use pcm::{BitDepth, ChunkedPcmKernel, PcmKernel, ReferencePcmKernel};
pub use slot::{BackendSlot, BackendStatus, LoadError};

/// Environment override; `reference` forces every family onto its
/// reference implementation.
pub const BACKEND_ENV: &str = "SPECTRAL_ENGINE_BACKEND";

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_accelerated")]
    pub accelerated: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            accelerated: default_accelerated(),
        }
    }
}

fn default_accelerated() -> bool {
    true
}

pub(crate) fn accelerated_allowed(config: &BackendConfig) -> Result<(), LoadError> {
    if !config.accelerated {
        return Err(LoadError::Disabled("disabled in configuration".into()));
    }
    match std::env::var(BACKEND_ENV) {
        Ok(value) if value.eq_ignore_ascii_case("reference") => Err(LoadError::Disabled(format!(
            "{}={}",
            BACKEND_ENV, value
        ))),
        _ => Ok(()),
    }
}

/// Dispatcher for a stateless kernel family: the accelerated kernel if its
/// slot loaded, otherwise the reference kernel.
pub struct KernelDispatcher<K: ?Sized> {
    accelerated: BackendSlot<K>,
    reference: Arc<K>,
}

impl<K: ?Sized + Send + Sync> KernelDispatcher<K> {
    pub fn new(accelerated: BackendSlot<K>, reference: Arc<K>) -> Self {
        Self {
            accelerated,
            reference,
        }
    }

    pub fn kernel(&self) -> Arc<K> {
        self.accelerated
            .get()
            .unwrap_or_else(|| Arc::clone(&self.reference))
    }

    pub fn reference(&self) -> Arc<K> {
        Arc::clone(&self.reference)
    }

    pub fn preload(&self) {
        self.accelerated.get();
    }

    pub fn status(&self) -> BackendStatus {
        self.accelerated.status()
    }
}

pub type PcmDispatcher = KernelDispatcher<dyn PcmKernel>;
pub type BeatDispatcher = KernelDispatcher<dyn BeatKernel>;

/// Status of every kernel family at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendReport {
    pub fft: BackendStatus,
    pub pcm: BackendStatus,
    pub beat: BackendStatus,
}

impl fmt::Display for BackendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {:<6} {}", "fft", self.fft)?;
        writeln!(f, "  {:<6} {}", "pcm", self.pcm)?;
        write!(f, "  {:<6} {}", "beat", self.beat)
    }
}

/// Owns one dispatcher per kernel family. Construct it once at startup and
/// share it (usually behind an `Arc`) with every consumer.
pub struct BackendRegistry {
    fft: FftDispatcher,
    pcm: PcmDispatcher,
    beat: BeatDispatcher,
}

impl BackendRegistry {
    pub fn new(config: &BackendConfig) -> Self {
        let fft = FftDispatcher::from_config(config);

        let pcm_config = config.clone();
        let pcm = PcmDispatcher::new(
            BackendSlot::new("pcm", move || pcm::load_chunked_kernel(&pcm_config)),
            Arc::new(ReferencePcmKernel),
        );

        let beat_config = config.clone();
        let beat = BeatDispatcher::new(
            BackendSlot::new("beat", move || beat::load_parallel_kernel(&beat_config)),
            Arc::new(ReferenceBeatKernel),
        );

        Self { fft, pcm, beat }
    }

    /// Registry pinned to the reference implementations.
    pub fn reference_only() -> Self {
        Self::from_parts(
            FftDispatcher::new(BackendSlot::disabled("fft", "reference-only registry")),
            PcmDispatcher::new(
                BackendSlot::disabled("pcm", "reference-only registry"),
                Arc::new(ReferencePcmKernel),
            ),
            BeatDispatcher::new(
                BackendSlot::disabled("beat", "reference-only registry"),
                Arc::new(ReferenceBeatKernel),
            ),
        )
    }

    pub fn from_parts(fft: FftDispatcher, pcm: PcmDispatcher, beat: BeatDispatcher) -> Self {
        Self { fft, pcm, beat }
    }

    pub fn fft(&self) -> &FftDispatcher {
        &self.fft
    }

    pub fn pcm(&self) -> &PcmDispatcher {
        &self.pcm
    }

    pub fn beat(&self) -> &BeatDispatcher {
        &self.beat
    }

    /// Load every accelerated module now instead of on first use.
    pub fn preload(&self) {
        self.fft.preload();
        self.pcm.preload();
        self.beat.preload();
    }

    /// Same as [`preload`](Self::preload) on a background thread. Callers
    /// that need a kernel before it finishes block on the in-flight load.
    pub fn preload_in_background(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        std::thread::spawn(move || registry.preload())
    }

    pub fn report(&self) -> BackendReport {
        BackendReport {
            fft: self.fft.status(),
            pcm: self.pcm.status(),
            beat: self.beat.status(),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(&BackendConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_only_registry_reports_unavailable_after_preload() {
        let registry = BackendRegistry::reference_only();
        assert_eq!(registry.report().fft, BackendStatus::Uninitialized);

        registry.preload();
        let report = registry.report();
        assert_eq!(report.fft, BackendStatus::Unavailable);
        assert_eq!(report.pcm, BackendStatus::Unavailable);
        assert_eq!(report.beat, BackendStatus::Unavailable);

        assert_eq!(registry.pcm().kernel().name(), "reference");
        assert!(registry.fft().kernel(256).is_ok());
    }

    #[test]
    fn disabled_config_keeps_reference_path() {
        let registry = BackendRegistry::new(&BackendConfig { accelerated: false });
        assert_eq!(registry.beat().kernel().name(), "reference");
        assert_eq!(registry.report().beat, BackendStatus::Unavailable);
    }

    #[test]
    fn background_preload_settles_every_family() {
        let registry = Arc::new(BackendRegistry::default());
        registry.preload_in_background().join().unwrap();

        let report = registry.report();
        for status in [report.fft, report.pcm, report.beat] {
            assert!(matches!(status, BackendStatus::Ready | BackendStatus::Unavailable));
        }
    }
}
