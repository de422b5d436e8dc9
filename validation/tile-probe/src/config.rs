//! Probe scenario configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use volume_common::{TilePathLayout, DEFAULT_ROW_WIDTH};

use crate::runner::{ProbeRequest, RunnerOptions, DEFAULT_MAX_COUNT};

/// Probe scenario loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Backend API root, e.g. `http://localhost:9000`.
    pub base_url: String,
    /// Prefix tiles are served under; defaults to `{base_url}/precomp`.
    #[serde(default)]
    pub tile_mount: Option<String>,
    pub volume: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_count")]
    pub count: i64,
    #[serde(default = "default_row_width")]
    pub row_width: u32,
    /// Upper bound on `count`.
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    #[serde(default)]
    pub layout: TilePathLayout,
    /// Per-tile timeout. Unset means requests may wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Fetch the volume's `info` before probing and check the level exists.
    #[serde(default)]
    pub check_info: bool,
}

fn default_level() -> String {
    "0".to_string()
}

fn default_count() -> i64 {
    8
}

fn default_row_width() -> u32 {
    DEFAULT_ROW_WIDTH
}

fn default_max_count() -> usize {
    DEFAULT_MAX_COUNT
}

impl ProbeConfig {
    /// Minimal scenario for a one-off probe.
    pub fn quick(base_url: impl Into<String>, volume: impl Into<String>) -> Self {
        Self {
            name: "quick".to_string(),
            description: "Quick tile probe".to_string(),
            base_url: base_url.into(),
            tile_mount: None,
            volume: volume.into(),
            level: default_level(),
            count: default_count(),
            row_width: DEFAULT_ROW_WIDTH,
            max_count: DEFAULT_MAX_COUNT,
            layout: TilePathLayout::default(),
            timeout_secs: None,
            check_info: false,
        }
    }

    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProbeConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url must not be empty");
        }
        if self.volume.trim().is_empty() {
            anyhow::bail!("volume must be specified");
        }
        if self.count <= 0 {
            anyhow::bail!("count must be > 0");
        }
        if self.count as u64 > self.max_count as u64 {
            anyhow::bail!("count {} exceeds max_count {}", self.count, self.max_count);
        }
        if self.row_width == 0 {
            anyhow::bail!("row_width must be > 0");
        }
        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be > 0 when set");
        }
        Ok(())
    }

    pub fn mount(&self) -> String {
        match &self.tile_mount {
            Some(mount) => mount.trim_end_matches('/').to_string(),
            None => format!("{}/precomp", self.base_url.trim_end_matches('/')),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            mount: self.mount(),
            layout: self.layout,
            row_width: self.row_width,
            max_count: self.max_count,
        }
    }

    pub fn request(&self) -> ProbeRequest {
        ProbeRequest::new(self.volume.clone(), self.level.clone(), self.count)
    }
}
