//! Single-tile HTTP fetch with latency and size measurement.

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{Duration, Instant};

/// HTTP status of a tile fetch, or `Err` when no response arrived at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Http(u16),
    Err,
}

impl TileStatus {
    pub fn code(&self) -> Option<u16> {
        match self {
            TileStatus::Http(code) => Some(*code),
            TileStatus::Err => None,
        }
    }
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileStatus::Http(code) => write!(f, "{}", code),
            TileStatus::Err => f.write_str("ERR"),
        }
    }
}

impl Serialize for TileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TileStatus::Http(code) => serializer.serialize_u16(*code),
            TileStatus::Err => serializer.serialize_str("ERR"),
        }
    }
}

/// Outcome of fetching one tile.
#[derive(Debug, Clone, Serialize)]
pub struct TileResult {
    pub index: usize,
    pub url: String,
    pub succeeded: bool,
    pub status: TileStatus,
    pub bytes: usize,
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub elapsed_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TileResult {
    /// Result for a response that arrived and whose body was fully read.
    pub fn response(index: usize, url: &str, status: u16, bytes: usize, started: Instant) -> Self {
        let elapsed = started.elapsed();
        Self {
            index,
            url: url.to_string(),
            succeeded: (200..300).contains(&status),
            status: TileStatus::Http(status),
            bytes,
            elapsed_ms: round_ms(elapsed),
            elapsed_us: elapsed.as_micros() as u64,
            error: None,
        }
    }

    /// Result for a fetch that produced no usable response.
    pub fn transport_error(index: usize, url: &str, started: Instant, reason: impl Into<String>) -> Self {
        let elapsed = started.elapsed();
        Self {
            index,
            url: url.to_string(),
            succeeded: false,
            status: TileStatus::Err,
            bytes: 0,
            elapsed_ms: round_ms(elapsed),
            elapsed_us: elapsed.as_micros() as u64,
            error: Some(reason.into()),
        }
    }
}

fn round_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

/// Fetches a single tile. Implementations must resolve every failure into
/// the returned [`TileResult`].
#[async_trait]
pub trait TileFetch: Send + Sync {
    async fn fetch(&self, index: usize, url: &str) -> TileResult;
}

/// [`TileFetch`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTileFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Bound each tile request. Without this a stalled server holds the
    /// batch open indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpTileFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl TileFetch for HttpTileFetcher {
    async fn fetch(&self, index: usize, url: &str) -> TileResult {
        let mut request = self.client.get(url).header(CACHE_CONTROL, "no-store");
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(index, url, error = %e, "Tile request failed");
                return TileResult::transport_error(index, url, start, describe(&e));
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => {
                let result = TileResult::response(index, url, status, body.len(), start);
                tracing::trace!(index, status, bytes = result.bytes, ms = result.elapsed_ms, "Tile fetched");
                result
            }
            Err(e) => {
                tracing::debug!(index, url, status, error = %e, "Tile body read failed");
                TileResult::transport_error(index, url, start, describe(&e))
            }
        }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
