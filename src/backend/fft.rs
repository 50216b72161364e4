//! FFT kernel family: the radix-2 reference core and a `rustfft`-planned
//! accelerated module behind one trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rustfft::num_complex::Complex;
use rustfft::Fft as _;
use rustfft::FftPlanner;

use super::slot::{BackendSlot, BackendStatus, LoadError};
use super::{accelerated_allowed, BackendConfig};
use crate::error::{EngineError, Result};
use crate::fft::{Fft, Spectrum, Windows};

/// One transform size worth of FFT operations.
pub trait FftKernel: Send + Sync {
    fn size(&self) -> usize;

    fn forward(&self, samples: &[f32]) -> Spectrum;

    fn inverse(&self, real: &[f32], imag: &[f32]) -> Vec<f32>;

    fn windows(&self) -> &Windows;

    fn magnitude(&self, samples: &[f32]) -> Vec<f32> {
        self.forward(samples).magnitude()
    }

    fn power(&self, samples: &[f32]) -> Vec<f32> {
        self.forward(samples).power()
    }

    fn magnitude_and_phase(&self, samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
        self.forward(samples).magnitude_and_phase()
    }

    fn from_magnitude_and_phase(&self, magnitude: &[f32], phase: &[f32]) -> Spectrum {
        Spectrum::from_magnitude_and_phase(magnitude, phase, self.size())
    }

    fn apply_analysis_window(&self, frame: &mut [f32]) {
        self.windows().apply_analysis(frame);
    }

    fn apply_synthesis_window(&self, frame: &mut [f32]) {
        self.windows().apply_synthesis(frame);
    }
}

impl FftKernel for Fft {
    fn size(&self) -> usize {
        Fft::size(self)
    }

    fn forward(&self, samples: &[f32]) -> Spectrum {
        Fft::forward(self, samples)
    }

    fn inverse(&self, real: &[f32], imag: &[f32]) -> Vec<f32> {
        Fft::inverse(self, real, imag)
    }

    fn windows(&self) -> &Windows {
        Fft::windows(self)
    }
}

/// Planned forward/inverse pair for one size.
pub struct PlannedFft {
    size: usize,
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    windows: Windows,
}

impl FftKernel for PlannedFft {
    fn size(&self) -> usize {
        self.size
    }

    fn forward(&self, samples: &[f32]) -> Spectrum {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        for (slot, &s) in buffer.iter_mut().zip(samples) {
            slot.re = s;
        }
        self.forward.process(&mut buffer);

        let (real, imag) = buffer.iter().map(|c| (c.re, c.im)).unzip();
        Spectrum { real, imag }
    }

    fn inverse(&self, real: &[f32], imag: &[f32]) -> Vec<f32> {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        for (slot, &re) in buffer.iter_mut().zip(real) {
            slot.re = re;
        }
        for (slot, &im) in buffer.iter_mut().zip(imag) {
            slot.im = im;
        }
        self.inverse.process(&mut buffer);

        let scale = 1.0 / self.size as f32;
        buffer.iter().map(|c| c.re * scale).collect()
    }

    fn windows(&self) -> &Windows {
        &self.windows
    }
}

/// Accelerated FFT module. Keeps one planned kernel per transform size, so
/// switching sizes never reconfigures an instance another caller holds.
pub struct PlannedFftModule {
    planner: Mutex<FftPlanner<f32>>,
    kernels: Mutex<HashMap<usize, Arc<PlannedFft>>>,
}

impl PlannedFftModule {
    pub fn new() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
            kernels: Mutex::new(HashMap::new()),
        }
    }

    pub fn kernel(&self, size: usize) -> Arc<PlannedFft> {
        let mut kernels = self.kernels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(kernel) = kernels.get(&size) {
            return Arc::clone(kernel);
        }

        let (forward, inverse) = {
            let mut planner = self.planner.lock().unwrap_or_else(PoisonError::into_inner);
            (planner.plan_fft_forward(size), planner.plan_fft_inverse(size))
        };
        log::debug!("Planned accelerated FFT of size {}", size);

        let kernel = Arc::new(PlannedFft {
            size,
            forward,
            inverse,
            windows: Windows::hann(size),
        });
        kernels.insert(size, Arc::clone(&kernel));
        kernel
    }

    pub fn cached_sizes(&self) -> Vec<usize> {
        let kernels = self.kernels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sizes: Vec<usize> = kernels.keys().copied().collect();
        sizes.sort_unstable();
        sizes
    }
}

impl Default for PlannedFftModule {
    fn default() -> Self {
        Self::new()
    }
}

const SELF_CHECK_SIZE: usize = 256;
const SELF_CHECK_TOLERANCE: f64 = 1e-3;

/// Bring up the planned module and verify it against the reference core on
/// a probe signal before handing it out.
pub fn load_planned_module(config: &BackendConfig) -> std::result::Result<Arc<PlannedFftModule>, LoadError> {
    accelerated_allowed(config)?;

    let module = PlannedFftModule::new();
    let reference = Fft::new(SELF_CHECK_SIZE)
        .map_err(|e| LoadError::Unsupported(e.to_string()))?;
    let accelerated = module.kernel(SELF_CHECK_SIZE);

    let probe: Vec<f32> = (0..SELF_CHECK_SIZE)
        .map(|n| {
            let t = n as f32;
            (0.13 * t).sin() + 0.5 * (0.71 * t).cos() + if n == 17 { 1.0 } else { 0.0 }
        })
        .collect();

    let expected = FftKernel::magnitude(&reference, &probe);
    let actual = accelerated.magnitude(&probe);
    let max_error = expected
        .iter()
        .zip(&actual)
        .map(|(a, b)| (a - b).abs() as f64)
        .fold(0.0f64, f64::max);

    if max_error > SELF_CHECK_TOLERANCE {
        return Err(LoadError::SelfCheckFailed { max_error });
    }
    Ok(Arc::new(module))
}

/// Routes FFT requests to the accelerated module when it loaded, otherwise
/// to cached reference cores.
pub struct FftDispatcher {
    accelerated: BackendSlot<PlannedFftModule>,
    reference: Mutex<HashMap<usize, Arc<Fft>>>,
}

impl FftDispatcher {
    pub fn new(accelerated: BackendSlot<PlannedFftModule>) -> Self {
        Self {
            accelerated,
            reference: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let config = config.clone();
        Self::new(BackendSlot::new("fft", move || load_planned_module(&config)))
    }

    /// Kernel for `size` on whichever path is active. Fails with
    /// `InvalidSize` on either path unless `size` is a power of two.
    pub fn kernel(&self, size: usize) -> Result<Arc<dyn FftKernel>> {
        if size == 0 || !size.is_power_of_two() {
            return Err(EngineError::InvalidSize(size));
        }
        if let Some(module) = self.accelerated.get() {
            let kernel: Arc<dyn FftKernel> = module.kernel(size);
            return Ok(kernel);
        }
        self.reference_kernel(size)
    }

    /// Reference kernel regardless of backend state.
    pub fn reference_kernel(&self, size: usize) -> Result<Arc<dyn FftKernel>> {
        let mut cache = self.reference.lock().unwrap_or_else(PoisonError::into_inner);
        let kernel = match cache.get(&size) {
            Some(kernel) => Arc::clone(kernel),
            None => {
                let kernel = Arc::new(Fft::new(size)?);
                cache.insert(size, Arc::clone(&kernel));
                kernel
            }
        };
        let kernel: Arc<dyn FftKernel> = kernel;
        Ok(kernel)
    }

    pub fn preload(&self) {
        self.accelerated.get();
    }

    pub fn status(&self) -> BackendStatus {
        self.accelerated.status()
    }
}
