//! Error types for the per-cycle path.
//!
//! Startup failures use `anyhow` and end the process. Everything in here is transient: the
//! loop logs it, backs off and tries the next cycle.

use thiserror::Error;

/// Failure to pull one encoded frame from the camera.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("camera fetch from {url} timed out")]
    Timeout { url: String },

    #[error("camera transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("camera returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed reading camera response body from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("camera returned an empty frame from {url}")]
    Empty { url: String },

    #[error("camera frame from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("frame source exhausted")]
    Exhausted,
}

/// Why a cycle was skipped.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to decode frame ({len} bytes)")]
    DecodeFailed { len: usize },

    #[error("detector failed: {0:#}")]
    Detect(anyhow::Error),

    #[error("display failed: {0:#}")]
    Display(anyhow::Error),

    #[error("cycle panicked: {message}")]
    Panicked { message: String },
}

impl CycleError {
    /// Short operator-facing category, used as a log prefix.
    pub fn category(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "network",
            CycleError::DecodeFailed { .. } => "stream",
            CycleError::Detect(_) => "detector",
            CycleError::Display(_) => "display",
            CycleError::Panicked { .. } => "panic",
        }
    }
}
