use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

/// Why an accelerated module could not be brought up. Never returned to
/// callers of the engine; it only decides which path a family runs on.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("accelerated path disabled: {0}")]
    Disabled(String),

    #[error("accelerated path unsupported: {0}")]
    Unsupported(String),

    #[error("self-check mismatch against reference (max error {max_error:e})")]
    SelfCheckFailed { max_error: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Uninitialized,
    Loading,
    Ready,
    Unavailable,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendStatus::Uninitialized => "uninitialized",
            BackendStatus::Loading => "loading",
            BackendStatus::Ready => "ready (accelerated)",
            BackendStatus::Unavailable => "unavailable (reference)",
        };
        f.write_str(label)
    }
}

const UNINITIALIZED: u8 = 0;
const LOADING: u8 = 1;
const READY: u8 = 2;
const UNAVAILABLE: u8 = 3;

type Loader<K> = Box<dyn Fn() -> Result<Arc<K>, LoadError> + Send + Sync>;

/// Lazily loaded accelerated module for one kernel family.
///
/// The loader runs at most once. Callers that arrive while it is running
/// block on the same initialization instead of starting their own, and a
/// failed load (error or panic) leaves the slot permanently unavailable.
pub struct BackendSlot<K: ?Sized> {
    family: &'static str,
    state: AtomicU8,
    module: OnceLock<Option<Arc<K>>>,
    loader: Loader<K>,
}

impl<K: ?Sized + Send + Sync> BackendSlot<K> {
    pub fn new<F>(family: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<K>, LoadError> + Send + Sync + 'static,
    {
        Self {
            family,
            state: AtomicU8::new(UNINITIALIZED),
            module: OnceLock::new(),
            loader: Box::new(loader),
        }
    }

    /// A slot whose loader always declines.
    pub fn disabled(family: &'static str, reason: &'static str) -> Self {
        Self::new(family, move || Err(LoadError::Disabled(reason.to_string())))
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    /// The accelerated module, loading it on first call. `None` means the
    /// family runs on its reference implementation.
    pub fn get(&self) -> Option<Arc<K>> {
        self.module.get_or_init(|| self.load()).clone()
    }

    pub fn status(&self) -> BackendStatus {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => BackendStatus::Uninitialized,
            LOADING => BackendStatus::Loading,
            READY => BackendStatus::Ready,
            _ => BackendStatus::Unavailable,
        }
    }

    fn load(&self) -> Option<Arc<K>> {
        self.state.store(LOADING, Ordering::Release);
        log::debug!("Loading accelerated {} backend...", self.family);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.loader)()));
        let module = match outcome {
            Ok(Ok(module)) => {
                log::info!("{} backend: accelerated module ready", self.family);
                Some(module)
            }
            Ok(Err(LoadError::Disabled(reason))) => {
                log::info!("{} backend: using reference path ({})", self.family, reason);
                None
            }
            Ok(Err(err)) => {
                log::warn!("{} backend: {}; falling back to reference path", self.family, err);
                None
            }
            Err(_) => {
                log::warn!(
                    "{} backend: loader panicked; falling back to reference path",
                    self.family
                );
                None
            }
        };

        let state = if module.is_some() { READY } else { UNAVAILABLE };
        self.state.store(state, Ordering::Release);
        module
    }
}

impl<K: ?Sized> fmt::Debug for BackendSlot<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("family", &self.family)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}
