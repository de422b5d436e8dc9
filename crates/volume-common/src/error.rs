//! Error types for volume metadata handling.

use thiserror::Error;

/// Result type alias using VolumeError.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Errors raised while interpreting volume metadata.
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Invalid volume info: {0}")]
    InvalidInfo(String),

    #[error("Scale '{level}' not found in volume (available: {available})")]
    ScaleNotFound { level: String, available: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
