pub mod config;
pub mod constants;
pub mod error;
pub mod generation;
pub mod persistence;
pub mod region;
pub mod store;
pub mod streaming;
pub mod world;

pub use config::{ConfigError, EngineConfig, StorageConfig, StoreConfig, StreamingConfig, WorkerConfig};
pub use error::{RegionError, RegionResult};
pub use generation::{GenerationPool, NoisePopulator, TerrainPlan, TerrainPopulator};
pub use persistence::{FileBackend, MemoryBackend, PersistenceError, RegionBackend, ThreadedLoader};
pub use region::{LocalTile, Region, RegionPos, SlicePos, TileId, TilePos};
pub use store::{CacheContext, CacheHandle, LoadRequest, RegionGenerator, RegionLoader, RegionStore, StoreStats};
pub use streaming::{SharedTarget, StreamTarget, StreamingWindow};
pub use world::WorldHooks;

use std::sync::Arc;

/// Store, loader and generator wired together
pub struct RegionEngine<B: RegionBackend> {
    pub store: Arc<RegionStore>,
    pub loader: Arc<ThreadedLoader<B>>,
    pub generator: Arc<GenerationPool>,
}

impl<B: RegionBackend> RegionEngine<B> {
    /// Build the full pipeline: loads go through `backend`, regions without
    /// terrain are forwarded to a [`GenerationPool`] driving `populator`.
    pub fn new(
        config: &EngineConfig,
        hooks: Arc<dyn WorldHooks>,
        backend: B,
        populator: Arc<dyn TerrainPopulator>,
    ) -> RegionResult<Self> {
        let mut parts: Option<RegionResult<(Arc<ThreadedLoader<B>>, Arc<GenerationPool>)>> = None;
        let workers = &config.workers;

        let store = RegionStore::new_cyclic(config.store.clone(), hooks, |store| {
            let built = GenerationPool::new(store.clone(), populator, workers.generator_threads).map(|pool| {
                let pool = Arc::new(pool);
                let generator: Arc<dyn RegionGenerator> = pool.clone();
                let loader = Arc::new(ThreadedLoader::new(backend, Some(generator), workers.loader_threads));
                (loader, pool)
            });
            let loader: Arc<dyn RegionLoader> = match &built {
                Ok((loader, _)) => loader.clone(),
                Err(_) => Arc::new(RejectingLoader),
            };
            parts = Some(built);
            loader
        });

        let (loader, generator) = parts.ok_or(RegionError::StoreDropped)??;
        Ok(Self { store, loader, generator })
    }

    /// Stop generation, flush every region and stop the loader.
    ///
    /// Returns false if the final saves did not finish within the store's
    /// shutdown timeout.
    pub fn shutdown(&self) -> bool {
        self.generator.shutdown();
        self.store.save_all();
        let done = self.store.wait_until_done();
        self.loader.shutdown();
        done
    }
}

/// Placeholder for a pipeline that failed to build; never reached by callers
struct RejectingLoader;

impl RegionLoader for RejectingLoader {
    fn load_region(&self, region: Arc<Region>, _request: LoadRequest) {
        if region.claim_load() {
            region.fail_load();
        }
    }

    fn save_region(&self, _region: Arc<Region>, handle: CacheHandle) {
        handle.dispose();
    }
}
