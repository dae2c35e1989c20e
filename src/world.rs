//! Seam between the region machinery and the world that owns it

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::region::{LocalTile, Region, RegionPos};

/// Callbacks from the store into the surrounding world.
///
/// `on_region_unload` runs on the simulation thread right before a region
/// leaves primary storage; entities living in it should be persisted or
/// despawned there.
pub trait WorldHooks: Send + Sync {
    /// Monotonic tick counter used for autosave spacing
    fn world_age(&self) -> u64;

    fn on_region_unload(&self, region: &Region);

    fn random_tile_update(&self, _region: &Region, _local: LocalTile) {}
}

/// Hooks with a manually advanced clock that records unloads
#[derive(Debug, Default)]
pub struct NullHooks {
    age: AtomicU64,
    unloaded: Mutex<Vec<RegionPos>>,
}

impl NullHooks {
    pub fn advance(&self, ticks: u64) {
        self.age.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Regions passed to `on_region_unload`, in order
    pub fn unloaded(&self) -> Vec<RegionPos> {
        self.unloaded.lock().clone()
    }
}

impl WorldHooks for NullHooks {
    fn world_age(&self) -> u64 {
        self.age.load(Ordering::Acquire)
    }

    fn on_region_unload(&self, region: &Region) {
        self.unloaded.lock().push(region.pos());
    }
}
