use thiserror::Error;

/// Errors raised synchronously by the engine. These are caller misuse, not
/// environmental failures; backend load failures never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transform size {0} is not a usable power of two")]
    InvalidSize(usize),

    #[error("noise reduction requested without a learned or assigned noise profile")]
    MissingProfile,

    #[error("noise sample has {samples} samples, at least {required} are needed for one analysis frame")]
    InsufficientSample { samples: usize, required: usize },

    #[error("PCM encoding supports 1 or 2 channels, got {0}")]
    UnsupportedChannels(usize),

    #[error("channel lengths differ: {left} vs {right} samples")]
    ChannelLengthMismatch { left: usize, right: usize },

    #[error("unsupported bit depth {0} (expected 16 or 24)")]
    UnsupportedBitDepth(u16),

    #[error("{bytes} bytes of sample data exceed the 4 GiB RIFF size limit")]
    DataTooLarge { bytes: usize },

    #[error("noise profile I/O failed: {0}")]
    ProfileIo(#[from] std::io::Error),

    #[error("malformed noise profile: {0}")]
    ProfileFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
