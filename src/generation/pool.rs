use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::populator::TerrainPopulator;
use crate::error::{RegionError, RegionResult};
use crate::region::Region;
use crate::store::{CacheContext, RegionGenerator, RegionStore};

/// Generation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub regions_generated: u64,
    pub regions_skipped: u64,
    pub in_flight: usize,
}

struct PoolShared {
    store: Weak<RegionStore>,
    populator: Arc<dyn TerrainPopulator>,
    in_flight: Mutex<usize>,
    idle: Condvar,
    generated: AtomicU64,
    skipped: AtomicU64,
}

/// Decrements the in-flight count even if a job unwinds
struct JobGuard<'a>(&'a PoolShared);

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.0.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Generates terrain for loaded regions on a dedicated thread pool.
///
/// Structures crossing into a neighbour are stamped there through a cache
/// pin, waiting for the neighbour's load first; if the neighbour has no
/// terrain yet the stamp is queued on it instead.
pub struct GenerationPool {
    shared: Arc<PoolShared>,
    pool: ThreadPool,
    closed: AtomicBool,
}

impl GenerationPool {
    pub fn new(
        store: Weak<RegionStore>,
        populator: Arc<dyn TerrainPopulator>,
        threads: usize,
    ) -> RegionResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|idx| format!("region-gen-{}", idx))
            .build()?;

        log::info!("[GenerationPool] Started with {} threads", pool.current_num_threads());

        Ok(Self {
            shared: Arc::new(PoolShared {
                store,
                populator,
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                generated: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            pool,
            closed: AtomicBool::new(false),
        })
    }

    pub fn try_submit(&self, region: Arc<Region>) -> RegionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegionError::WorkerShutdown {
                pool: "region-generator",
            });
        }
        *self.shared.in_flight.lock() += 1;
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let _guard = JobGuard(&shared);
            shared.generate(&region);
        });
        Ok(())
    }

    /// Block until no generation job is queued or running
    pub fn wait_idle(&self) {
        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            self.shared.idle.wait(&mut in_flight);
        }
    }

    /// Refuse new work and wait for the queued jobs to finish
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wait_idle();
        log::info!(
            "[GenerationPool] Shut down after generating {} regions",
            self.shared.generated.load(Ordering::Relaxed)
        );
    }

    pub fn stats(&self) -> GenerationStats {
        GenerationStats {
            regions_generated: self.shared.generated.load(Ordering::Relaxed),
            regions_skipped: self.shared.skipped.load(Ordering::Relaxed),
            in_flight: *self.shared.in_flight.lock(),
        }
    }
}

impl RegionGenerator for GenerationPool {
    fn submit(&self, region: Arc<Region>) {
        if let Err(e) = self.try_submit(Arc::clone(&region)) {
            log::debug!("[GenerationPool] Not generating {}: {}", region.pos(), e);
        }
    }
}

impl PoolShared {
    fn generate(&self, region: &Arc<Region>) {
        if !region.claim_generation() {
            return;
        }
        let pos = region.pos();
        let Some(store) = self.store.upgrade() else {
            log::debug!("[GenerationPool] Skipping {}: {}", pos, RegionError::StoreDropped);
            return;
        };

        let started = Instant::now();
        let mut ctx = CacheContext::new();

        // Pinning the region itself gets the finished terrain saved on release
        let pinned = store.cache(&mut ctx, pos);
        if !Arc::ptr_eq(&pinned, region) {
            log::debug!("[GenerationPool] Region {} left memory before generation", pos);
            store.uncache_all(&mut ctx);
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let plan = self.populator.populate(pos);
        let mut own_stamps = Vec::new();
        for structure in plan.structures {
            for (target, part) in structure.split_by_region() {
                if target == pos {
                    own_stamps.push(part);
                    continue;
                }
                let neighbour = store.cache(&mut ctx, target);
                match neighbour.wait_until_loaded() {
                    Ok(()) => neighbour.stamp_or_defer(part),
                    Err(e) => log::warn!(
                        "[GenerationPool] Dropping structure part from {} for {}: {}",
                        pos,
                        target,
                        e
                    ),
                }
            }
        }

        region.finish_generation(plan.slices, own_stamps);
        store.uncache_all(&mut ctx);

        self.generated.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "[GenerationPool] Generated {} in {:.2}ms",
            pos,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
}
