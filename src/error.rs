//! Error taxonomy for the scanner.
//!
//! Only configuration and catalog failures are fatal; everything raised while
//! the monitor loop is running is reported as an event and the loop carries on.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The target window is not present (not running, closed, zero-area).
    #[error("target surface not found")]
    SurfaceNotFound,

    /// Capturing a present surface failed for this cycle.
    #[error("capture failed: {0}")]
    CaptureFailure(String),

    #[error("required file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("invalid config {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must abort startup rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMissing(_) | Self::ConfigInvalid { .. })
    }
}
