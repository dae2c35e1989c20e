use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHasher};

use super::cache::CachedRegion;
use crate::region::RegionPos;

pub(crate) type Stripe = FxHashMap<RegionPos, CachedRegion>;

/// Cache storage partitioned over a fixed set of locks.
///
/// The stripe lock for a coordinate also serialises the "primary, else
/// cache, else create" sequences for it, so holding the guard returned by
/// [`lock`](Self::lock) is what makes lookup-or-create atomic.
pub(crate) struct CacheStripes {
    stripes: Box<[Mutex<Stripe>]>,
}

impl CacheStripes {
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            stripes: (0..count).map(|_| Mutex::new(Stripe::default())).collect(),
        }
    }

    #[inline]
    pub fn index_of(&self, pos: RegionPos) -> usize {
        let mut hasher = FxHasher::default();
        pos.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    pub fn lock(&self, pos: RegionPos) -> MutexGuard<'_, Stripe> {
        self.stripes[self.index_of(pos)].lock()
    }

    pub fn count(&self) -> usize {
        self.stripes.len()
    }

    /// Coordinates currently cached; locks each stripe in turn
    pub fn positions(&self) -> Vec<RegionPos> {
        let mut positions: Vec<RegionPos> = self
            .stripes
            .iter()
            .flat_map(|stripe| stripe.lock().keys().copied().collect::<Vec<_>>())
            .collect();
        positions.sort();
        positions
    }
}
