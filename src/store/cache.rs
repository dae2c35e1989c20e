use std::fmt;
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;

use super::RegionStore;
use crate::region::{Region, RegionPos};

/// Entry in cache storage.
///
/// `times_pinned` counts one resident pin plus one per caller context holding
/// the region. Only save completion takes it from 1 to 0 and removes the entry.
pub(crate) struct CachedRegion {
    pub region: Arc<Region>,
    pub times_pinned: usize,
}

impl CachedRegion {
    /// Entry holding only the resident pin
    pub fn resident(region: Arc<Region>) -> Self {
        Self {
            region,
            times_pinned: 1,
        }
    }
}

/// Pins held by one caller of [`RegionStore::cache`].
///
/// Repeated `cache` calls for the same coordinate through one context are
/// served locally and cost a single pin; [`RegionStore::uncache_all`]
/// releases them together.
#[derive(Default)]
pub struct CacheContext {
    pinned: FxHashMap<RegionPos, Arc<Region>>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pos: RegionPos) -> Option<&Arc<Region>> {
        self.pinned.get(&pos)
    }

    pub fn contains(&self, pos: RegionPos) -> bool {
        self.pinned.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    pub(crate) fn record(&mut self, region: Arc<Region>) {
        self.pinned.insert(region.pos(), region);
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<Region>> {
        self.pinned.drain().map(|(_, region)| region).collect()
    }
}

impl Drop for CacheContext {
    fn drop(&mut self) {
        if !self.pinned.is_empty() {
            log::warn!(
                "[RegionStore] CacheContext dropped holding {} pins; those regions stay cached",
                self.pinned.len()
            );
        }
    }
}

impl fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContext")
            .field("pinned", &self.pinned.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Completion token for one save dispatched to a [`RegionLoader`].
///
/// Disposing (or dropping) the handle tells the store the save finished:
/// the `saving` flag clears, a save requested in the meantime is
/// re-dispatched, and an entry held only by its resident pin leaves the cache.
///
/// [`RegionLoader`]: super::RegionLoader
pub struct CacheHandle {
    store: Weak<RegionStore>,
    region: Arc<Region>,
}

impl CacheHandle {
    pub(crate) fn new(store: Weak<RegionStore>, region: Arc<Region>) -> Self {
        Self { store, region }
    }

    pub fn pos(&self) -> RegionPos {
        self.region.pos()
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    pub fn dispose(self) {}
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        match self.store.upgrade() {
            Some(store) => store.complete_save(&self.region),
            None => log::debug!(
                "[RegionStore] Save of {} completed after the store was dropped",
                self.region.pos()
            ),
        }
    }
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle").field("pos", &self.region.pos()).finish()
    }
}
