//! Typed documents exchanged with the volume backend.
//!
//! Every endpoint decodes into exactly one of these types. A response that
//! does not match is a schema error, not something to patch up field by field.

use crate::error::{VolumeError, VolumeResult};
use serde::{Deserialize, Serialize};

/// Precomputed `info` document describing a converted volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    #[serde(rename = "type", default = "default_volume_type")]
    pub volume_type: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default = "default_num_channels")]
    pub num_channels: u32,
    pub scales: Vec<Scale>,
}

fn default_volume_type() -> String {
    "image".to_string()
}

fn default_data_type() -> String {
    "uint8".to_string()
}

fn default_num_channels() -> u32 {
    1
}

/// One resolution level of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub key: String,
    pub size: [u64; 3],
    pub resolution: [f64; 3],
    pub chunk_sizes: Vec<[u64; 3]>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub voxel_offset: [i64; 3],
}

fn default_encoding() -> String {
    "raw".to_string()
}

impl VolumeInfo {
    /// Parse and sanity-check an `info` document.
    pub fn from_json(json: &str) -> VolumeResult<Self> {
        let info: VolumeInfo = serde_json::from_str(json)?;
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> VolumeResult<()> {
        if self.scales.is_empty() {
            return Err(VolumeError::InvalidInfo("no scales defined".to_string()));
        }
        for scale in &self.scales {
            if scale.chunk_sizes.is_empty() {
                return Err(VolumeError::InvalidInfo(format!(
                    "scale '{}' has no chunk sizes",
                    scale.key
                )));
            }
        }
        Ok(())
    }

    /// Keys of all resolution levels, finest first.
    pub fn level_keys(&self) -> Vec<&str> {
        self.scales.iter().map(|s| s.key.as_str()).collect()
    }

    pub fn scale(&self, level: &str) -> VolumeResult<&Scale> {
        self.scales
            .iter()
            .find(|s| s.key == level)
            .ok_or_else(|| VolumeError::ScaleNotFound {
                level: level.to_string(),
                available: self.level_keys().join(", "),
            })
    }
}

impl Scale {
    /// Number of chunks along x and y for the primary chunk size.
    pub fn grid_extent(&self) -> (u64, u64) {
        let chunk = self.chunk_sizes.first().copied().unwrap_or([1, 1, 1]);
        let cx = chunk[0].max(1);
        let cy = chunk[1].max(1);
        (self.size[0].div_ceil(cx), self.size[1].div_ceil(cy))
    }
}

/// Envelope returned by the volume listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeList {
    pub volumes: Vec<VolumeSummary>,
    pub count: usize,
}

/// A converted volume as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub name: String,
    pub path: String,
    pub info_url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub dimensions: Option<[u64; 3]>,
    #[serde(default)]
    pub chunk_size: Option<[u64; 3]>,
}

/// Token response from the login endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub login_id: String,
    pub user_name: String,
    pub role: String,
}

/// Server resource snapshot from the memory status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub memory: MemoryUsage,
    #[serde(default)]
    pub cache: CacheStats,
    #[serde(default)]
    pub config: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Resident size of the server process.
    pub process_mb: f64,
    pub system_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    #[serde(default)]
    pub cache_size_mb: f64,
    /// Fraction in `0.0..=1.0`.
    #[serde(default)]
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub cache_max_size_mb: f64,
}

/// Acknowledgement returned by mutating admin endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
