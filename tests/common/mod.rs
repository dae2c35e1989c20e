#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use terra_regions::world::NullHooks;
use terra_regions::{CacheHandle, LoadRequest, Region, RegionLoader, RegionPos, RegionStore, StoreConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Loader that completes loads inline and holds saves until released
#[derive(Default)]
pub struct RecordingLoader {
    pub loads: Mutex<Vec<(RegionPos, LoadRequest)>>,
    pub saves: Mutex<Vec<CacheHandle>>,
    pub saved: Mutex<Vec<RegionPos>>,
    pub failing: Mutex<HashSet<RegionPos>>,
}

impl RecordingLoader {
    pub fn fail_loads_of(&self, pos: RegionPos) {
        self.failing.lock().insert(pos);
    }

    pub fn pending_saves(&self) -> usize {
        self.saves.lock().len()
    }

    /// Complete every save currently held; returns how many were completed
    pub fn finish_saves(&self) -> usize {
        let handles: Vec<_> = self.saves.lock().drain(..).collect();
        let count = handles.len();
        for handle in handles {
            self.saved.lock().push(handle.pos());
            handle.dispose();
        }
        count
    }

    pub fn loads_of(&self, pos: RegionPos) -> Vec<LoadRequest> {
        self.loads
            .lock()
            .iter()
            .filter(|(p, _)| *p == pos)
            .map(|(_, r)| *r)
            .collect()
    }
}

impl RegionLoader for RecordingLoader {
    fn load_region(&self, region: Arc<Region>, request: LoadRequest) {
        self.loads.lock().push((region.pos(), request));
        if region.claim_load() {
            if self.failing.lock().contains(&region.pos()) {
                region.fail_load();
            } else {
                region.finish_load(None);
            }
        }
    }

    fn save_region(&self, region: Arc<Region>, handle: CacheHandle) {
        region.take_snapshot();
        self.saves.lock().push(handle);
    }
}

pub struct Harness {
    pub store: Arc<RegionStore>,
    pub loader: Arc<RecordingLoader>,
    pub hooks: Arc<NullHooks>,
}

pub fn harness(unload_delay_ticks: u32) -> Harness {
    init_logging();
    let loader = Arc::new(RecordingLoader::default());
    let hooks = Arc::new(NullHooks::default());
    let config = StoreConfig {
        unload_delay_ticks,
        shutdown_timeout: Duration::from_secs(2),
        ..StoreConfig::default()
    };
    let store = RegionStore::new(config, hooks.clone(), loader.clone());
    Harness { store, loader, hooks }
}
