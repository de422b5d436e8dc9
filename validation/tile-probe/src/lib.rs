//! Tile probe for precomputed volume servers.
//!
//! This crate provides tools to:
//! - Build raster-ordered tile requests for a volume level
//! - Fetch them concurrently, recording status, size and latency per tile
//! - Summarize and format the results (console, JSON, CSV)
//! - Talk to the volume backend for login, listing and `info`

pub mod api_client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod session;

pub use api_client::ApiClient;
pub use config::ProbeConfig;
pub use error::{parse_count, ProbeError, ProbeResult};
pub use fetcher::{HttpTileFetcher, TileFetch, TileResult, TileStatus};
pub use metrics::ProbeSummary;
pub use report::ProbeReport;
pub use runner::{
    ProbeBatch, ProbeRequest, ProbeRunner, ProbeState, RunnerOptions, DEFAULT_MAX_COUNT,
};
pub use session::Session;
