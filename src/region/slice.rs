use serde::{Deserialize, Serialize};

use crate::constants::geometry::{SLICES_PER_REGION, TILES_PER_SLICE};

/// Tile identifier; the payload of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileId(pub u16);

impl TileId {
    pub const EMPTY: TileId = TileId(0);
    pub const STONE: TileId = TileId(1);
    pub const SOIL: TileId = TileId(2);
    pub const GRASS: TileId = TileId(3);
    pub const WATER: TileId = TileId(4);
    pub const SAND: TileId = TileId(5);
    pub const BOULDER: TileId = TileId(6);
}

/// Dense grid of tiles; the sub-chunk unit inside a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    tiles: Vec<TileId>,
}

impl Default for Slice {
    fn default() -> Self {
        Self::filled(TileId::EMPTY)
    }
}

impl Slice {
    pub fn filled(tile: TileId) -> Self {
        Self {
            tiles: vec![tile; TILES_PER_SLICE],
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> TileId {
        self.tiles[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, tile: TileId) {
        self.tiles[index] = tile;
    }

    pub fn is_uniform(&self) -> bool {
        self.tiles.windows(2).all(|w| w[0] == w[1])
    }

    /// Whether the tile vector has the expected length; used to reject corrupt records
    pub fn is_well_formed(&self) -> bool {
        self.tiles.len() == TILES_PER_SLICE
    }
}

/// Fresh slice grid for a region
pub fn empty_slices() -> Vec<Slice> {
    vec![Slice::default(); SLICES_PER_REGION]
}
