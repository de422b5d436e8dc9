//! Summary statistics over a probe batch.

use crate::fetcher::TileStatus;
use crate::runner::ProbeBatch;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Aggregate view of one probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub timestamp: String,
    pub volume: String,
    pub level: String,
    pub total: usize,
    pub succeeded: usize,
    /// Responses that arrived with a non-2xx status.
    pub http_errors: usize,
    /// Fetches that never produced a response.
    pub transport_errors: usize,
    pub success_rate: f64,
    pub total_bytes: u64,
    pub cancelled: bool,
    pub wall_ms: u64,

    // Latency over all tiles (ms)
    pub latency_min: f64,
    pub latency_p50: f64,
    pub latency_p90: f64,
    pub latency_p99: f64,
    pub latency_max: f64,
    pub latency_avg: f64,
}

impl ProbeSummary {
    pub fn from_batch(batch: &ProbeBatch) -> Self {
        // 3 significant figures; `record` grows the range for long stalls.
        let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is a valid histogram precision");
        let mut succeeded = 0;
        let mut http_errors = 0;
        let mut transport_errors = 0;
        let mut total_bytes = 0u64;

        for result in &batch.results {
            histogram.record(result.elapsed_us).ok();
            total_bytes += result.bytes as u64;
            match (result.succeeded, result.status) {
                (true, _) => succeeded += 1,
                (false, TileStatus::Http(_)) => http_errors += 1,
                (false, TileStatus::Err) => transport_errors += 1,
            }
        }

        let total = batch.results.len();
        let success_rate = if total > 0 {
            succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let ms = |us: u64| us as f64 / 1000.0;

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            volume: batch.volume.clone(),
            level: batch.level.clone(),
            total,
            succeeded,
            http_errors,
            transport_errors,
            success_rate,
            total_bytes,
            cancelled: batch.cancelled,
            wall_ms: batch.wall_ms,
            latency_min: ms(histogram.min()),
            latency_p50: ms(histogram.value_at_percentile(50.0)),
            latency_p90: ms(histogram.value_at_percentile(90.0)),
            latency_p99: ms(histogram.value_at_percentile(99.0)),
            latency_max: ms(histogram.max()),
            latency_avg: histogram.mean() / 1000.0,
        }
    }
}
