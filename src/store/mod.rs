//! Two-tier region storage
//!
//! Primary storage holds regions taking part in the simulation; only the
//! simulation thread writes it. Cache storage holds regions pinned by other
//! threads (tools, generators) and regions whose final save is in flight.
//! The same `Arc<Region>` is reused whenever a coordinate moves between the
//! two tiers, so every caller observes one instance per coordinate.

mod cache;
mod interfaces;
mod stripes;

pub use cache::{CacheContext, CacheHandle};
pub use interfaces::{LoadRequest, RegionGenerator, RegionLoader};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::config::StoreConfig;
use crate::region::{Region, RegionPos, TickOutcome, TickParams};
use crate::world::WorldHooks;
use cache::CachedRegion;
use stripes::CacheStripes;

/// Point-in-time counters for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub primary: usize,
    pub cached: usize,
    pub saves_in_flight: usize,
}

/// Owner of every region in memory
pub struct RegionStore {
    config: StoreConfig,
    hooks: Arc<dyn WorldHooks>,
    loader: Arc<dyn RegionLoader>,
    /// Primary storage
    regions: DashMap<RegionPos, Arc<Region>>,
    /// Cache storage, partitioned under the stripe locks
    stripes: CacheStripes,
    cached: AtomicUsize,
    saves_in_flight: AtomicUsize,
    done_lock: Mutex<()>,
    done_signal: Condvar,
    self_ref: Weak<RegionStore>,
}

impl RegionStore {
    pub fn new(
        config: StoreConfig,
        hooks: Arc<dyn WorldHooks>,
        loader: Arc<dyn RegionLoader>,
    ) -> Arc<Self> {
        Self::new_cyclic(config, hooks, |_| loader)
    }

    /// Build a store whose loader needs a handle back to it (a generator
    /// pinning neighbours, for instance)
    pub fn new_cyclic<F>(config: StoreConfig, hooks: Arc<dyn WorldHooks>, make_loader: F) -> Arc<Self>
    where
        F: FnOnce(&Weak<RegionStore>) -> Arc<dyn RegionLoader>,
    {
        Arc::new_cyclic(|self_ref| {
            let loader = make_loader(self_ref);
            log::info!(
                "[RegionStore] Created with {} stripes, unload delay {} ticks",
                config.stripe_count,
                config.unload_delay_ticks
            );
            Self {
                stripes: CacheStripes::new(config.stripe_count),
                config,
                hooks,
                loader,
                regions: DashMap::new(),
                cached: AtomicUsize::new(0),
                saves_in_flight: AtomicUsize::new(0),
                done_lock: Mutex::new(()),
                done_signal: Condvar::new(),
                self_ref: self_ref.clone(),
            }
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Primary path (simulation thread)
    // ---------------------------------------------------------------------

    /// Return the region at `pos`, bringing it into primary storage if needed.
    ///
    /// Never blocks on I/O: a missing region is returned immediately with
    /// its load dispatched in the background.
    pub fn load_region(&self, pos: RegionPos, make_active: bool) -> Arc<Region> {
        if let Some(region) = self.region(pos) {
            if make_active {
                self.activate(&region);
            }
            return region;
        }

        let (region, needs_load) = {
            let stripe = self.stripes.lock(pos);
            // Another thread may have inserted it since the lookup above
            if let Some(region) = self.region(pos) {
                drop(stripe);
                if make_active {
                    self.activate(&region);
                }
                return region;
            }
            let (region, needs_load) = match stripe.get(&pos) {
                // Recovered from cache; it may have been loaded without terrain
                Some(entry) => {
                    let region = Arc::clone(&entry.region);
                    region.reset_countdown();
                    let needs_load = !region.is_generated();
                    (region, needs_load)
                }
                None => (Arc::new(Region::new(pos)), true),
            };
            self.regions.insert(pos, Arc::clone(&region));
            (region, needs_load)
        };

        log::trace!("[RegionStore] Region {} entered primary storage", pos);

        if needs_load {
            self.loader.load_region(
                Arc::clone(&region),
                LoadRequest {
                    generate: true,
                    make_active,
                },
            );
        }
        if make_active {
            self.activate(&region);
        }
        region
    }

    /// Primary lookup
    pub fn region(&self, pos: RegionPos) -> Option<Arc<Region>> {
        self.regions.get(&pos).map(|entry| Arc::clone(entry.value()))
    }

    /// Load, activate and anchor. Callable from any thread.
    pub fn anchor(&self, pos: RegionPos) -> Arc<Region> {
        self.load_claimed(pos, true, Region::anchor, Region::deanchor)
    }

    /// Load `pos` and apply `claim` to the instance that ends up in primary.
    ///
    /// Eviction re-checks every claim under the stripe lock, so an instance
    /// still found there after claiming stays until the claim is released.
    fn load_claimed(
        &self,
        pos: RegionPos,
        make_active: bool,
        claim: impl Fn(&Region),
        release: impl Fn(&Region),
    ) -> Arc<Region> {
        loop {
            let region = self.load_region(pos, make_active);
            claim(&region);
            if self.is_resident(&region) {
                return region;
            }
            log::debug!("[RegionStore] Region {} was evicted while being claimed, retrying", pos);
            release(&region);
            if make_active {
                self.deactivate(&region);
            }
        }
    }

    fn is_resident(&self, region: &Arc<Region>) -> bool {
        let pos = region.pos();
        let _stripe = self.stripes.lock(pos);
        self.region(pos)
            .is_some_and(|current| Arc::ptr_eq(&current, region))
    }

    /// # Panics
    /// If `pos` is not in primary storage or has no anchors.
    pub fn deanchor(&self, pos: RegionPos) {
        match self.region(pos) {
            Some(region) => region.deanchor(),
            None => panic!("deanchor of region {} which is not loaded", pos),
        }
    }

    /// Mark active and count it towards every neighbour, loading absent
    /// neighbours without activating them
    pub fn activate(&self, region: &Arc<Region>) {
        if !region.set_active(true) {
            return;
        }
        for neighbour in region.pos().neighbours() {
            self.load_claimed(
                neighbour,
                false,
                Region::add_active_neighbour,
                Region::remove_active_neighbour,
            );
        }
    }

    /// Inverse of [`activate`](Self::activate). Neighbours of an active
    /// region cannot leave primary storage, so every one is still present.
    pub fn deactivate(&self, region: &Arc<Region>) {
        if !region.set_active(false) {
            return;
        }
        for neighbour in region.pos().neighbours() {
            match self.region(neighbour) {
                Some(n) => n.remove_active_neighbour(),
                None => log::error!(
                    "[RegionStore] Neighbour {} of active region {} was missing",
                    neighbour,
                    region.pos()
                ),
            }
        }
    }

    /// Tick every primary region, then autosave and unload as they request.
    pub fn update_regions(&self) {
        let params = TickParams {
            world_age: self.hooks.world_age(),
            unload_delay_ticks: self.config.unload_delay_ticks,
            autosave_interval_ticks: self.config.autosave_interval_ticks,
        };

        // Snapshot first; primary storage must not be mutated while iterated
        let regions: Vec<Arc<Region>> = self
            .regions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut expired = Vec::new();
        for region in &regions {
            match region.tick(&params, self.hooks.as_ref()) {
                TickOutcome::Idle => {}
                TickOutcome::Autosave => self.save_region(region),
                TickOutcome::Expired => expired.push(Arc::clone(region)),
            }
        }

        expired.retain(|region| !region.is_anchored());

        // Deactivate the whole batch before unloading so mutually
        // neighbouring regions can leave on the same tick
        for region in &expired {
            self.deactivate(region);
        }

        let mut unloaded = 0;
        for region in &expired {
            if region.active_neighbour_count() == 0 && self.unload(region) {
                unloaded += 1;
            }
        }

        if unloaded > 0 {
            log::debug!(
                "[RegionStore] Unloaded {} regions ({} remain in primary)",
                unloaded,
                self.regions.len()
            );
        }
    }

    /// Returns false if the region was claimed again before it could leave
    fn unload(&self, region: &Arc<Region>) -> bool {
        let pos = region.pos();
        self.hooks.on_region_unload(region);
        // Pin in cache before leaving primary so the instance stays reachable
        self.save_region(region);

        let evicted = {
            let _stripe = self.stripes.lock(pos);
            // Any anchor since the tick either still holds or reset the countdown
            let idle = !region.is_anchored()
                && !region.is_active()
                && region.active_neighbour_count() == 0
                && region.idle_ticks() >= self.config.unload_delay_ticks;
            if idle {
                self.regions.remove(&pos);
            }
            idle
        };

        if !evicted {
            log::debug!("[RegionStore] Region {} was claimed during unload, kept in primary", pos);
            if region.is_anchored() {
                self.activate(region);
            }
        }
        evicted
    }

    /// Request a save of every region in primary storage
    pub fn save_all(&self) {
        let regions: Vec<Arc<Region>> = self
            .regions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        log::info!("[RegionStore] Saving {} regions", regions.len());
        for region in &regions {
            self.save_region(region);
        }
    }

    // ---------------------------------------------------------------------
    // Cache path (any thread)
    // ---------------------------------------------------------------------

    /// Pin the region at `pos` for the caller owning `ctx`.
    ///
    /// The region may still be loading; use `Region::wait_until_loaded`
    /// before reading it.
    pub fn cache(&self, ctx: &mut CacheContext, pos: RegionPos) -> Arc<Region> {
        if let Some(region) = ctx.get(pos) {
            return Arc::clone(region);
        }

        let (region, fresh) = {
            let mut stripe = self.stripes.lock(pos);
            match stripe.get_mut(&pos) {
                Some(entry) => {
                    entry.times_pinned += 1;
                    (Arc::clone(&entry.region), false)
                }
                None => {
                    let (region, fresh) = match self.region(pos) {
                        Some(region) => (region, false),
                        None => (Arc::new(Region::new(pos)), true),
                    };
                    stripe.insert(
                        pos,
                        CachedRegion {
                            region: Arc::clone(&region),
                            times_pinned: 2,
                        },
                    );
                    self.cached.fetch_add(1, Ordering::AcqRel);
                    (region, fresh)
                }
            }
        };

        if fresh {
            self.loader.load_region(Arc::clone(&region), LoadRequest::default());
        }
        ctx.record(Arc::clone(&region));
        region
    }

    /// Release every pin held by `ctx`. Regions left with only their
    /// resident pin are saved and leave the cache once the save completes.
    pub fn uncache_all(&self, ctx: &mut CacheContext) {
        for region in ctx.drain() {
            let pos = region.pos();
            let dispatch = {
                let mut stripe = self.stripes.lock(pos);
                match stripe.get_mut(&pos) {
                    Some(entry) => {
                        assert!(
                            entry.times_pinned > 1,
                            "uncache of region {} without a caller pin",
                            pos
                        );
                        entry.times_pinned -= 1;
                        entry.times_pinned == 1 && region.request_save(self.hooks.world_age())
                    }
                    None => {
                        log::error!("[RegionStore] Region {} pinned by a context but not cached", pos);
                        false
                    }
                }
            };
            if dispatch {
                self.dispatch_save(region);
            }
        }
    }

    /// One-shot cache pin: make sure the region has a cache entry and
    /// request a save through the same completion path
    pub fn save_region(&self, region: &Arc<Region>) {
        let pos = region.pos();
        let dispatch = {
            let mut stripe = self.stripes.lock(pos);
            let entry = stripe.entry(pos).or_insert_with(|| {
                self.cached.fetch_add(1, Ordering::AcqRel);
                CachedRegion::resident(Arc::clone(region))
            });
            debug_assert!(Arc::ptr_eq(&entry.region, region));
            region.request_save(self.hooks.world_age())
        };
        if dispatch {
            self.dispatch_save(Arc::clone(region));
        }
    }

    fn dispatch_save(&self, region: Arc<Region>) {
        self.saves_in_flight.fetch_add(1, Ordering::AcqRel);
        let handle = CacheHandle::new(self.self_ref.clone(), Arc::clone(&region));
        self.loader.save_region(region, handle);
    }

    /// Called when a [`CacheHandle`] is disposed
    pub(crate) fn complete_save(&self, region: &Arc<Region>) {
        self.saves_in_flight.fetch_sub(1, Ordering::AcqRel);
        let pos = region.pos();

        let (redispatch, removed) = {
            let mut stripe = self.stripes.lock(pos);
            if region.complete_save() {
                (true, false)
            } else if stripe.get(&pos).is_some_and(|entry| entry.times_pinned == 1) {
                stripe.remove(&pos);
                (false, true)
            } else {
                (false, false)
            }
        };

        if redispatch {
            log::trace!("[RegionStore] Re-dispatching save of {}", pos);
            self.dispatch_save(Arc::clone(region));
        }
        if removed {
            self.cached.fetch_sub(1, Ordering::AcqRel);
            let _guard = self.done_lock.lock();
            self.done_signal.notify_all();
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_cached(&self) -> usize {
        self.cached.load(Ordering::Acquire)
    }

    /// Whether every primary region is prepared
    pub fn is_loaded(&self) -> bool {
        self.regions.iter().all(|entry| entry.value().is_prepared())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            primary: self.num_regions(),
            cached: self.num_cached(),
            saves_in_flight: self.saves_in_flight.load(Ordering::Acquire),
        }
    }

    /// Block until cache storage is empty or the shutdown timeout passes.
    ///
    /// Returns false on timeout after logging the coordinates still cached.
    pub fn wait_until_done(&self) -> bool {
        let deadline = Instant::now() + self.config.shutdown_timeout;
        let mut guard = self.done_lock.lock();
        while self.num_cached() > 0 {
            if self.done_signal.wait_until(&mut guard, deadline).timed_out() && self.num_cached() > 0 {
                let remaining = self.stripes.positions();
                log::warn!(
                    "[RegionStore] Timed out waiting for {} cached regions: {:?}",
                    remaining.len(),
                    remaining
                );
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for RegionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionStore")
            .field("stats", &self.stats())
            .field("stripes", &self.stripes.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::NullHooks;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Loads complete inline; saves are held until released
    #[derive(Default)]
    struct ManualLoader {
        loads: Mutex<Vec<(RegionPos, LoadRequest)>>,
        saves: Mutex<Vec<CacheHandle>>,
    }

    impl ManualLoader {
        fn finish_saves(&self) -> usize {
            let handles: Vec<_> = self.saves.lock().drain(..).collect();
            let count = handles.len();
            for handle in handles {
                handle.dispose();
            }
            count
        }
    }

    impl RegionLoader for ManualLoader {
        fn load_region(&self, region: Arc<Region>, request: LoadRequest) {
            self.loads.lock().push((region.pos(), request));
            if region.claim_load() {
                region.finish_load(None);
            }
        }

        fn save_region(&self, region: Arc<Region>, handle: CacheHandle) {
            region.take_snapshot();
            self.saves.lock().push(handle);
        }
    }

    /// Claims one region from inside its unload callback, the way a worker
    /// thread anchoring at that moment would
    struct ClaimingHooks {
        target: RegionPos,
        release: bool,
        fired: AtomicBool,
    }

    impl ClaimingHooks {
        fn new(target: RegionPos, release: bool) -> Self {
            Self {
                target,
                release,
                fired: AtomicBool::new(false),
            }
        }
    }

    impl WorldHooks for ClaimingHooks {
        fn world_age(&self) -> u64 {
            0
        }

        fn on_region_unload(&self, region: &Region) {
            if region.pos() == self.target && !self.fired.swap(true, Ordering::AcqRel) {
                region.anchor();
                if self.release {
                    region.deanchor();
                }
            }
        }
    }

    fn store_with_hooks<H: WorldHooks + 'static>(delay: u32, hooks: Arc<H>) -> (Arc<RegionStore>, Arc<ManualLoader>) {
        let loader = Arc::new(ManualLoader::default());
        let config = StoreConfig {
            unload_delay_ticks: delay,
            shutdown_timeout: Duration::from_millis(50),
            ..StoreConfig::default()
        };
        let store = RegionStore::new(config, hooks, loader.clone());
        (store, loader)
    }

    fn store_with(delay: u32) -> (Arc<RegionStore>, Arc<ManualLoader>, Arc<NullHooks>) {
        let hooks = Arc::new(NullHooks::default());
        let (store, loader) = store_with_hooks(delay, hooks.clone());
        (store, loader, hooks)
    }

    #[test]
    fn test_activation_loads_neighbours_inactive() {
        let (store, loader, _) = store_with(10);
        let region = store.anchor(RegionPos::new(0, 0));

        assert!(region.is_active());
        assert_eq!(store.num_regions(), 9);
        for n in RegionPos::new(0, 0).neighbours() {
            let neighbour = store.region(n).unwrap();
            assert!(!neighbour.is_active());
            assert_eq!(neighbour.active_neighbour_count(), 1);
        }
        let urgent = loader.loads.lock().iter().filter(|(_, r)| r.make_active).count();
        assert_eq!(urgent, 1);
    }

    #[test]
    fn test_expired_cluster_unloads_after_deactivation() {
        let (store, loader, hooks) = store_with(1);
        store.anchor(RegionPos::new(0, 0));
        store.deanchor(RegionPos::new(0, 0));

        store.update_regions();
        assert_eq!(store.num_regions(), 0);
        assert_eq!(hooks.unloaded().len(), 9);

        // Every unloaded region waits in cache for its save
        assert_eq!(store.num_cached(), 9);
        assert_eq!(loader.finish_saves(), 9);
        assert_eq!(store.num_cached(), 0);
        assert!(store.wait_until_done());
    }

    #[test]
    fn test_wait_until_done_times_out() {
        let (store, _loader, _) = store_with(1);
        let region = store.load_region(RegionPos::new(2, 2), false);
        store.save_region(&region);
        assert!(!store.wait_until_done());
    }

    #[test]
    #[should_panic(expected = "not loaded")]
    fn test_deanchor_missing_region_panics() {
        let (store, _loader, _) = store_with(1);
        store.deanchor(RegionPos::new(9, 9));
    }

    #[test]
    fn test_anchor_taken_during_unload_keeps_region() {
        let center = RegionPos::new(0, 0);
        let hooks = Arc::new(ClaimingHooks::new(center, false));
        let (store, loader) = store_with_hooks(1, hooks);
        let region = store.anchor(center);
        store.deanchor(center);

        store.update_regions();

        let kept = store.region(center).expect("anchored region must stay in primary");
        assert!(Arc::ptr_eq(&region, &kept));
        assert_eq!(kept.anchor_count(), 1);
        assert!(kept.is_active());
        assert_eq!(store.num_regions(), 9);
        for n in center.neighbours() {
            assert_eq!(store.region(n).unwrap().active_neighbour_count(), 1);
        }

        store.deanchor(center);
        loader.finish_saves();
    }

    #[test]
    fn test_anchor_released_during_unload_restarts_countdown() {
        let pos = RegionPos::new(4, -4);
        let hooks = Arc::new(ClaimingHooks::new(pos, true));
        let (store, loader) = store_with_hooks(2, hooks);
        store.load_region(pos, false);

        store.update_regions();
        store.update_regions();
        assert!(store.region(pos).is_some(), "countdown was restarted during unload");
        assert_eq!(store.region(pos).unwrap().idle_ticks(), 0);

        store.update_regions();
        assert!(store.region(pos).is_some());
        store.update_regions();
        assert!(store.region(pos).is_none());

        while loader.finish_saves() > 0 {}
        assert_eq!(store.num_cached(), 0);
    }

    #[test]
    fn test_region_recovered_from_cache_restarts_countdown() {
        let (store, loader, _) = store_with(2);
        let pos = RegionPos::new(1, 1);
        let region = store.load_region(pos, false);
        store.update_regions();
        store.update_regions();
        assert!(store.region(pos).is_none());
        assert!(region.idle_ticks() >= 2);

        // Still waiting in cache for its save
        let recovered = store.load_region(pos, false);
        assert!(Arc::ptr_eq(&region, &recovered));
        assert_eq!(recovered.idle_ticks(), 0);
        store.update_regions();
        assert!(store.region(pos).is_some(), "needs a full countdown again");

        store.update_regions();
        assert!(store.region(pos).is_none());
        while loader.finish_saves() > 0 {}
    }
}
