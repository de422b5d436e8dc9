//! Tile coordinates, raster sequencing and request path construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row width used by the probe when none is configured.
pub const DEFAULT_ROW_WIDTH: u32 = 4;

/// A tile coordinate within one resolution level of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Path segment in the `{x}_{y}_{z}` form served by the backend.
    pub fn segment(&self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Ordering of the level and coordinate segments in a tile path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TilePathLayout {
    /// `{mount}/{volume}/{level}/{x}_{y}_{z}`
    #[default]
    LevelFirst,
    /// `{mount}/{volume}/{x}_{y}_{z}/{level}`
    CoordsFirst,
}

impl std::str::FromStr for TilePathLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "level_first" => Ok(Self::LevelFirst),
            "coords_first" => Ok(Self::CoordsFirst),
            other => Err(format!(
                "unknown tile layout '{}' (expected level_first or coords_first)",
                other
            )),
        }
    }
}

/// Build the request path for one tile.
///
/// No validation is done here; a malformed volume or level simply yields a
/// path the backend will reject.
pub fn tile_path(
    mount: &str,
    volume: &str,
    level: &str,
    coord: TileCoord,
    layout: TilePathLayout,
) -> String {
    let mount = mount.trim_end_matches('/');
    match layout {
        TilePathLayout::LevelFirst => {
            format!("{}/{}/{}/{}", mount, volume, level, coord.segment())
        }
        TilePathLayout::CoordsFirst => {
            format!("{}/{}/{}/{}", mount, volume, coord.segment(), level)
        }
    }
}

/// One tile to be fetched from a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub volume: String,
    pub level: String,
    pub coord: TileCoord,
}

impl TileRequest {
    pub fn new(volume: impl Into<String>, level: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            volume: volume.into(),
            level: level.into(),
            coord,
        }
    }

    /// Full request URL under the given mount.
    pub fn url(&self, mount: &str, layout: TilePathLayout) -> String {
        tile_path(mount, &self.volume, &self.level, self.coord, layout)
    }

    /// Requests for the first `count` tiles of a level in raster order.
    pub fn raster(volume: &str, level: &str, count: usize, row_width: u32) -> Vec<TileRequest> {
        RasterSequence::new(count, row_width)
            .map(|coord| TileRequest::new(volume, level, coord))
            .collect()
    }
}

/// Raster-scan sequence of tile coordinates.
///
/// Position `i` maps to `(i % width, i / width, 0)`. Cloning a fresh
/// sequence restarts it from the first tile.
#[derive(Debug, Clone)]
pub struct RasterSequence {
    width: u32,
    count: usize,
    next: usize,
}

impl RasterSequence {
    pub fn new(count: usize, row_width: u32) -> Self {
        Self {
            width: row_width.max(1),
            count,
            next: 0,
        }
    }

    pub fn row_width(&self) -> u32 {
        self.width
    }

    /// Coordinate at an arbitrary position, independent of iteration state.
    pub fn coord_at(&self, index: usize) -> TileCoord {
        let width = self.width as usize;
        TileCoord::new((index % width) as u32, (index / width) as u32, 0)
    }
}

impl Iterator for RasterSequence {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        if self.next >= self.count {
            return None;
        }
        let coord = self.coord_at(self.next);
        self.next += 1;
        Some(coord)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RasterSequence {}
