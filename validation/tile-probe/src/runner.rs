//! Concurrent tile probe orchestration.
//!
//! A probe builds `count` tile requests in raster order, dispatches all of
//! them at once and waits for every one to resolve. Results come back
//! ordered by request index regardless of completion order.

use crate::error::{ProbeError, ProbeResult};
use crate::fetcher::{TileFetch, TileResult};
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use volume_common::{TilePathLayout, TileRequest, DEFAULT_ROW_WIDTH};

/// Largest batch a runner accepts unless configured otherwise.
pub const DEFAULT_MAX_COUNT: usize = 10_000;

/// User-supplied parameters for one probe run.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub volume: String,
    pub level: String,
    /// Signed so that zero and negative input can be rejected explicitly.
    pub count: i64,
}

impl ProbeRequest {
    pub fn new(volume: impl Into<String>, level: impl Into<String>, count: i64) -> Self {
        Self {
            volume: volume.into(),
            level: level.into(),
            count,
        }
    }

    /// Check the request before any network activity.
    /// Returns the validated tile count.
    pub fn validate(&self) -> ProbeResult<usize> {
        if self.volume.trim().is_empty() {
            return Err(ProbeError::MissingVolume);
        }
        if self.count <= 0 {
            return Err(ProbeError::InvalidCount(self.count.to_string()));
        }
        usize::try_from(self.count).map_err(|_| ProbeError::InvalidCount(self.count.to_string()))
    }
}

/// Externally visible runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Idle,
    Running,
}

/// Results of one probe run, ordered by request index.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeBatch {
    pub volume: String,
    pub level: String,
    pub results: Vec<TileResult>,
    pub cancelled: bool,
    pub wall_ms: u64,
}

impl ProbeBatch {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.succeeded() == self.results.len()
    }
}

/// Runner settings that stay fixed across probe runs.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// URL prefix the tile paths are appended to.
    pub mount: String,
    pub layout: TilePathLayout,
    pub row_width: u32,
    /// Counts above this are rejected before anything is allocated.
    pub max_count: usize,
}

impl RunnerOptions {
    pub fn new(mount: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            layout: TilePathLayout::default(),
            row_width: DEFAULT_ROW_WIDTH,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

/// Fans tile fetches out concurrently and collects them back in order.
pub struct ProbeRunner {
    fetcher: Arc<dyn TileFetch>,
    options: RunnerOptions,
    state: watch::Sender<ProbeState>,
    last_batch: Option<ProbeBatch>,
    progress: ProgressBar,
}

/// Puts the runner back to `Idle` when a run ends, including when the run
/// future is dropped before fan-in completes.
struct RunningGuard<'a> {
    state: &'a watch::Sender<ProbeState>,
    progress: &'a ProgressBar,
}

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a watch::Sender<ProbeState>, progress: &'a ProgressBar) -> Self {
        state.send_replace(ProbeState::Running);
        Self { state, progress }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.progress.finish();
        self.state.send_replace(ProbeState::Idle);
    }
}

impl ProbeRunner {
    pub fn new(fetcher: Arc<dyn TileFetch>, options: RunnerOptions) -> Self {
        let (state, _) = watch::channel(ProbeState::Idle);
        Self {
            fetcher,
            options,
            state,
            last_batch: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-tile completion on the given progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn state(&self) -> ProbeState {
        *self.state.borrow()
    }

    /// Observe Idle/Running transitions.
    pub fn subscribe(&self) -> watch::Receiver<ProbeState> {
        self.state.subscribe()
    }

    /// Batch from the most recent completed run, cleared while running.
    pub fn last_batch(&self) -> Option<&ProbeBatch> {
        self.last_batch.as_ref()
    }

    /// Build the ordered request URLs for a validated count.
    pub fn plan(&self, volume: &str, level: &str, count: usize) -> Vec<String> {
        TileRequest::raster(volume, level, count, self.options.row_width)
            .iter()
            .map(|r| r.url(&self.options.mount, self.options.layout))
            .collect()
    }

    /// Run a probe to completion.
    pub async fn run(&mut self, request: ProbeRequest) -> ProbeResult<&ProbeBatch> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a probe that stops early once `cancel` fires.
    ///
    /// Fetches still in flight at cancellation resolve to ERR results, so the
    /// batch always holds one entry per requested tile.
    pub async fn run_with_cancel(
        &mut self,
        request: ProbeRequest,
        cancel: CancellationToken,
    ) -> ProbeResult<&ProbeBatch> {
        if self.state() == ProbeState::Running {
            return Err(ProbeError::AlreadyRunning);
        }
        let count = request.validate()?;
        if count > self.options.max_count {
            return Err(ProbeError::InvalidCount(format!(
                "{} exceeds the limit of {}",
                count, self.options.max_count
            )));
        }
        let volume = request.volume.trim().to_string();
        let level = request.level.trim().to_string();
        let urls = self.plan(&volume, &level, count);

        self.last_batch = None;
        let running = RunningGuard::enter(&self.state, &self.progress);
        self.progress.set_length(count as u64);
        self.progress.set_position(0);

        info!(volume = %volume, level = %level, count, "Starting tile probe");
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let cancel = cancel.clone();
            let url = url.clone();
            tasks.spawn(async move {
                let start = Instant::now();
                let result = tokio::select! {
                    result = fetcher.fetch(index, &url) => result,
                    _ = cancel.cancelled() => TileResult::transport_error(index, &url, start, "cancelled"),
                };
                (index, result)
            });
        }

        // Completion order is arbitrary; each result lands in its dispatch slot.
        let mut slots: Vec<Option<TileResult>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, mut result)) => {
                    result.index = index;
                    slots[index] = Some(result);
                }
                Err(e) => warn!(error = %e, "Tile task failed"),
            }
            self.progress.inc(1);
        }

        let results: Vec<TileResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    TileResult::transport_error(index, &urls[index], started, "task failed")
                })
            })
            .collect();

        let batch = ProbeBatch {
            volume,
            level,
            results,
            cancelled: cancel.is_cancelled(),
            wall_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            succeeded = batch.succeeded(),
            total = batch.len(),
            wall_ms = batch.wall_ms,
            cancelled = batch.cancelled,
            "Tile probe complete"
        );

        drop(running);
        Ok(&*self.last_batch.insert(batch))
    }
}
