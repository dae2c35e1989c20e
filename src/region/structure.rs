use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::position::{RegionPos, TilePos};
use super::slice::TileId;

/// A set of tile writes belonging to one structure, restricted to a single region.
///
/// Structures placed near a region border spill into neighbours. The part that
/// lands in a region which is not generated yet is queued there and applied
/// once its own terrain exists, so generation never overwrites the stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureStamp {
    /// World tile the structure is anchored at; may lie in another region
    pub origin: TilePos,
    pub tiles: Vec<(TilePos, TileId)>,
}

impl StructureStamp {
    pub fn new(origin: TilePos) -> Self {
        Self {
            origin,
            tiles: Vec::new(),
        }
    }

    pub fn push(&mut self, pos: TilePos, tile: TileId) {
        self.tiles.push((pos, tile));
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Split a structure spanning several regions into one stamp per region
    pub fn split_by_region(self) -> Vec<(RegionPos, StructureStamp)> {
        let mut parts: BTreeMap<RegionPos, StructureStamp> = BTreeMap::new();
        for (pos, tile) in self.tiles {
            parts
                .entry(pos.to_region_pos())
                .or_insert_with(|| StructureStamp::new(self.origin))
                .push(pos, tile);
        }
        parts.into_iter().collect()
    }

    /// Whether every tile of the stamp lies inside `region`
    pub fn targets(&self, region: RegionPos) -> bool {
        self.tiles.iter().all(|(pos, _)| pos.to_region_pos() == region)
    }
}
