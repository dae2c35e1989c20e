use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::geometry::REGION_TILES;
use crate::region::{empty_slices, LocalTile, RegionPos, Slice, StructureStamp, TileId, TilePos};

/// Terrain for one region plus the structures rooted in it.
///
/// Structures may reach into neighbouring regions; the pool splits them.
#[derive(Debug, Clone)]
pub struct TerrainPlan {
    pub slices: Vec<Slice>,
    pub structures: Vec<StructureStamp>,
}

/// Produces terrain for a region from its coordinate alone
pub trait TerrainPopulator: Send + Sync {
    fn populate(&self, pos: RegionPos) -> TerrainPlan;
}

/// Perlin height field with scattered boulders
pub struct NoisePopulator {
    height_noise: Perlin,
    detail_noise: Perlin,
    seed: u32,
    max_boulders: u32,
}

impl NoisePopulator {
    pub fn new(seed: u32) -> Self {
        Self {
            height_noise: Perlin::new(seed),
            detail_noise: Perlin::new(seed.wrapping_add(1)),
            seed,
            max_boulders: 4,
        }
    }

    pub fn with_max_boulders(mut self, max_boulders: u32) -> Self {
        self.max_boulders = max_boulders;
        self
    }

    /// Height in roughly -1.5..1.5
    pub fn height(&self, x: f64, y: f64) -> f64 {
        let large = self.height_noise.get([x * 0.01, y * 0.01]);
        let detail = self.detail_noise.get([x * 0.05, y * 0.05]) * 0.5;
        large + detail
    }

    fn tile_for_height(height: f64) -> TileId {
        match height {
            h if h < -0.3 => TileId::WATER,
            h if h < -0.2 => TileId::SAND,
            h if h < 0.3 => TileId::GRASS,
            h if h < 0.6 => TileId::SOIL,
            _ => TileId::STONE,
        }
    }

    /// Deterministic per-region generator for structure placement
    fn create_rng(&self, pos: RegionPos) -> StdRng {
        let region_seed = (self.seed as u64)
            .wrapping_add(pos.x as u64)
            .wrapping_mul(73856093)
            .wrapping_add(pos.y as u64)
            .wrapping_mul(19349663);
        StdRng::seed_from_u64(region_seed)
    }

    fn place_boulder(&self, origin: TilePos, radius: i32) -> StructureStamp {
        let mut stamp = StructureStamp::new(origin);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    stamp.push(origin.offset(dx, dy), TileId::BOULDER);
                }
            }
        }
        stamp
    }
}

impl TerrainPopulator for NoisePopulator {
    fn populate(&self, pos: RegionPos) -> TerrainPlan {
        let mut slices = empty_slices();
        let min = pos.min_tile();
        for ly in 0..REGION_TILES {
            for lx in 0..REGION_TILES {
                let height = self.height((min.x + lx) as f64, (min.y + ly) as f64);
                let local = LocalTile::new(lx as u16, ly as u16);
                slices[local.slice_index()].set(local.tile_index(), Self::tile_for_height(height));
            }
        }

        let mut rng = self.create_rng(pos);
        let count = rng.gen_range(0..=self.max_boulders);
        let structures = (0..count)
            .map(|_| {
                let origin = min.offset(rng.gen_range(0..REGION_TILES), rng.gen_range(0..REGION_TILES));
                let radius = rng.gen_range(1..=3);
                self.place_boulder(origin, radius)
            })
            .collect();

        TerrainPlan { slices, structures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_is_deterministic() {
        let populator = NoisePopulator::new(12345);
        let a = populator.populate(RegionPos::new(4, -2));
        let b = populator.populate(RegionPos::new(4, -2));
        assert_eq!(a.slices, b.slices);
        assert_eq!(a.structures, b.structures);
    }

    #[test]
    fn test_structures_rooted_in_region() {
        let populator = NoisePopulator::new(7).with_max_boulders(16);
        let pos = RegionPos::new(-1, 0);
        let plan = populator.populate(pos);
        for structure in &plan.structures {
            assert_eq!(structure.origin.to_region_pos(), pos);
            assert!(!structure.is_empty());
        }
    }

    #[test]
    fn test_no_boulders_when_disabled() {
        let populator = NoisePopulator::new(7).with_max_boulders(0);
        assert!(populator.populate(RegionPos::new(0, 0)).structures.is_empty());
    }
}
