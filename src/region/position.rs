use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::geometry::{REGION_SLICES, REGION_TILES, SLICE_SIZE};

/// Position of a region in the world (region coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub y: i32,
}

impl RegionPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Create a new region position offset by the given amounts
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The 8 surrounding region positions
    pub fn neighbours(&self) -> impl Iterator<Item = RegionPos> {
        let origin = *self;
        (-1..=1)
            .flat_map(move |dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .map(move |(dx, dy)| origin.offset(dx, dy))
    }

    /// Chebyshev distance, the metric the square streaming window uses
    pub fn chebyshev_distance(&self, other: RegionPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// World tile at the region's minimum corner
    pub fn min_tile(&self) -> TilePos {
        TilePos::new(self.x * REGION_TILES, self.y * REGION_TILES)
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Position of a slice in the world (slice coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlicePos {
    pub x: i32,
    pub y: i32,
}

impl SlicePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Get the region this slice belongs to
    pub fn to_region_pos(&self) -> RegionPos {
        RegionPos::new(self.x.div_euclid(REGION_SLICES), self.y.div_euclid(REGION_SLICES))
    }
}

/// Position of a tile in the world (world coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn to_slice_pos(&self) -> SlicePos {
        SlicePos::new(self.x.div_euclid(SLICE_SIZE), self.y.div_euclid(SLICE_SIZE))
    }

    pub fn to_region_pos(&self) -> RegionPos {
        RegionPos::new(self.x.div_euclid(REGION_TILES), self.y.div_euclid(REGION_TILES))
    }

    /// Get local position within the owning region
    pub fn to_local(&self) -> LocalTile {
        LocalTile {
            x: self.x.rem_euclid(REGION_TILES) as u16,
            y: self.y.rem_euclid(REGION_TILES) as u16,
        }
    }
}

/// Tile position relative to its region's minimum corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalTile {
    pub x: u16,
    pub y: u16,
}

impl LocalTile {
    pub fn new(x: u16, y: u16) -> Self {
        debug_assert!((x as i32) < REGION_TILES && (y as i32) < REGION_TILES);
        Self { x, y }
    }

    /// Index of the slice holding this tile within the region's slice grid
    pub fn slice_index(&self) -> usize {
        let sx = self.x as usize / SLICE_SIZE as usize;
        let sy = self.y as usize / SLICE_SIZE as usize;
        sy * REGION_SLICES as usize + sx
    }

    /// Index of this tile within its slice
    pub fn tile_index(&self) -> usize {
        let tx = self.x as usize % SLICE_SIZE as usize;
        let ty = self.y as usize % SLICE_SIZE as usize;
        ty * SLICE_SIZE as usize + tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_to_region_conversion() {
        assert_eq!(TilePos::new(0, 0).to_region_pos(), RegionPos::new(0, 0));
        assert_eq!(TilePos::new(REGION_TILES, 5).to_region_pos(), RegionPos::new(1, 0));
        // Negative coordinates floor instead of truncating toward zero
        assert_eq!(TilePos::new(-1, -REGION_TILES).to_region_pos(), RegionPos::new(-1, -1));
        assert_eq!(TilePos::new(-REGION_TILES - 1, 0).to_region_pos(), RegionPos::new(-2, 0));
    }

    #[test]
    fn test_local_tile_wraps_negative() {
        let local = TilePos::new(-1, -1).to_local();
        assert_eq!(local.x as i32, REGION_TILES - 1);
        assert_eq!(local.y as i32, REGION_TILES - 1);
    }

    #[test]
    fn test_slice_to_region_conversion() {
        assert_eq!(SlicePos::new(REGION_SLICES - 1, 0).to_region_pos(), RegionPos::new(0, 0));
        assert_eq!(SlicePos::new(-1, REGION_SLICES).to_region_pos(), RegionPos::new(-1, 1));
    }

    #[test]
    fn test_neighbours_excludes_self() {
        let center = RegionPos::new(3, -2);
        let neighbours: Vec<_> = center.neighbours().collect();
        assert_eq!(neighbours.len(), 8);
        assert!(!neighbours.contains(&center));
        assert!(neighbours.iter().all(|n| n.chebyshev_distance(center) == 1));
    }

    #[test]
    fn test_local_tile_indices() {
        let local = LocalTile::new(SLICE_SIZE as u16 + 3, 2 * SLICE_SIZE as u16 + 1);
        assert_eq!(local.slice_index(), 2 * REGION_SLICES as usize + 1);
        assert_eq!(local.tile_index(), SLICE_SIZE as usize + 3);
    }
}
