//! Common types shared by the precomputed-volume tooling.

pub mod error;
pub mod tile;
pub mod volume;

pub use error::{VolumeError, VolumeResult};
pub use tile::{
    tile_path, RasterSequence, TileCoord, TilePathLayout, TileRequest, DEFAULT_ROW_WIDTH,
};
pub use volume::{
    CacheConfig, CacheStats, LoginResponse, MemoryStatus, MemoryUsage, MessageResponse, Scale,
    VolumeInfo, VolumeList, VolumeSummary,
};
