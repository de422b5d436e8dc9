//! Errors surfaced to the caller of a probe.
//!
//! Per-tile failures never show up here; they are recorded on the
//! corresponding [`TileResult`](crate::fetcher::TileResult).

use thiserror::Error;
use volume_common::VolumeError;

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Select a volume before fetching tiles")]
    MissingVolume,

    #[error("Fetch count must be a positive integer (got {0})")]
    InvalidCount(String),

    #[error("A probe is already running")]
    AlreadyRunning,

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Volume not found: {0}")]
    VolumeNotFound(String),

    #[error("Unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Response from {endpoint} did not match the expected schema: {message}")]
    Schema { endpoint: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

impl ProbeError {
    /// True for errors raised before any network activity.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProbeError::MissingVolume | ProbeError::InvalidCount(_) | ProbeError::AlreadyRunning
        )
    }
}

/// Parse a tile count typed by a user.
///
/// Accepts surrounding whitespace; rejects anything that is not an integer
/// greater than zero.
pub fn parse_count(input: &str) -> ProbeResult<i64> {
    let trimmed = input.trim();
    match trimmed.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ProbeError::InvalidCount(trimmed.to_string())),
    }
}
