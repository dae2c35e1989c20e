//! Threaded region loader
//!
//! Serves the store's load and save requests on a small pool of named
//! worker threads. Loads for regions being activated go through a separate
//! urgent channel that workers drain before anything else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::backend::RegionBackend;
use crate::error::RegionError;
use crate::region::Region;
use crate::store::{CacheHandle, LoadRequest, RegionGenerator, RegionLoader};

enum Job {
    Load(Arc<Region>, LoadRequest),
    Save(Arc<Region>, CacheHandle),
}

/// Loader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub saves_completed: u64,
    pub saves_failed: u64,
    pub queued: usize,
}

struct LoaderShared<B: RegionBackend> {
    backend: B,
    generator: Option<Arc<dyn RegionGenerator>>,
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
    saves_completed: AtomicU64,
    saves_failed: AtomicU64,
}

struct Channels {
    urgent: Sender<Job>,
    normal: Sender<Job>,
}

/// [`RegionLoader`] backed by a [`RegionBackend`] and worker threads
pub struct ThreadedLoader<B: RegionBackend> {
    shared: Arc<LoaderShared<B>>,
    channels: Mutex<Option<Channels>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: RegionBackend> ThreadedLoader<B> {
    /// Spawn `threads` workers. Regions that finish loading without terrain
    /// are forwarded to `generator` when their request asked for it.
    pub fn new(backend: B, generator: Option<Arc<dyn RegionGenerator>>, threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(LoaderShared {
            backend,
            generator,
            loads_completed: AtomicU64::new(0),
            loads_failed: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
            saves_failed: AtomicU64::new(0),
        });
        let (urgent_tx, urgent_rx) = unbounded();
        let (normal_tx, normal_rx) = unbounded();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let urgent = urgent_rx.clone();
            let normal = normal_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("region-loader-{}", i))
                .spawn(move || worker_loop(&shared, &urgent, &normal));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("[ThreadedLoader] Failed to spawn worker {}: {}", i, e),
            }
        }

        log::info!("[ThreadedLoader] Started {} worker threads", workers.len());

        Self {
            shared,
            channels: Mutex::new(Some(Channels {
                urgent: urgent_tx,
                normal: normal_tx,
            })),
            workers: Mutex::new(workers),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn stats(&self) -> LoaderStats {
        let queued = self
            .channels
            .lock()
            .as_ref()
            .map(|c| c.urgent.len() + c.normal.len())
            .unwrap_or(0);
        LoaderStats {
            loads_completed: self.shared.loads_completed.load(Ordering::Relaxed),
            loads_failed: self.shared.loads_failed.load(Ordering::Relaxed),
            saves_completed: self.shared.saves_completed.load(Ordering::Relaxed),
            saves_failed: self.shared.saves_failed.load(Ordering::Relaxed),
            queued,
        }
    }

    /// Stop accepting work, let the workers drain what is queued and join them
    pub fn shutdown(&self) {
        if self.channels.lock().take().is_none() {
            return;
        }
        let current = thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("[ThreadedLoader] Worker thread panicked");
            }
        }
        log::info!("[ThreadedLoader] Shut down");
    }

    fn enqueue(&self, job: Job, urgent: bool) -> Result<(), Job> {
        let guard = self.channels.lock();
        let Some(channels) = guard.as_ref() else {
            return Err(job);
        };
        let sender = if urgent { &channels.urgent } else { &channels.normal };
        sender.send(job).map_err(|e| e.into_inner())
    }

    fn rejected(&self) -> RegionError {
        RegionError::WorkerShutdown { pool: "region-loader" }
    }
}

impl<B: RegionBackend> RegionLoader for ThreadedLoader<B> {
    fn load_region(&self, region: Arc<Region>, request: LoadRequest) {
        if let Err(Job::Load(region, _)) = self.enqueue(Job::Load(region, request), request.make_active) {
            log::warn!("[ThreadedLoader] Load of {} rejected: {}", region.pos(), self.rejected());
            if region.claim_load() {
                region.fail_load();
            }
        }
    }

    fn save_region(&self, region: Arc<Region>, handle: CacheHandle) {
        if let Err(Job::Save(region, handle)) = self.enqueue(Job::Save(region, handle), false) {
            log::warn!("[ThreadedLoader] Save of {} rejected: {}", region.pos(), self.rejected());
            handle.dispose();
        }
    }
}

fn worker_loop<B: RegionBackend>(shared: &LoaderShared<B>, urgent: &Receiver<Job>, normal: &Receiver<Job>) {
    loop {
        let next = match urgent.try_recv() {
            Ok(job) => Some(job),
            Err(_) => select! {
                recv(urgent) -> job => job.ok(),
                recv(normal) -> job => job.ok(),
            },
        };
        let Some(job) = next else {
            break;
        };
        shared.run(job);
    }

    // Senders are gone; finish whatever was already queued
    for job in urgent.try_iter().chain(normal.try_iter()) {
        shared.run(job);
    }
}

impl<B: RegionBackend> LoaderShared<B> {
    fn run(&self, job: Job) {
        match job {
            Job::Load(region, request) => self.load(&region, request),
            Job::Save(region, handle) => {
                self.save(&region);
                handle.dispose();
            }
        }
    }

    fn load(&self, region: &Arc<Region>, request: LoadRequest) {
        self.ensure_loaded(region);
        if let Err(e) = region.wait_until_loaded() {
            log::debug!("[ThreadedLoader] Not generating {}: {}", region.pos(), e);
            return;
        }
        if request.generate && !region.is_generated() {
            match &self.generator {
                Some(generator) => generator.submit(Arc::clone(region)),
                None => log::warn!(
                    "[ThreadedLoader] Region {} needs generation but no generator is attached",
                    region.pos()
                ),
            }
        }
    }

    /// Read the region if nobody has claimed its load yet
    fn ensure_loaded(&self, region: &Region) {
        if !region.claim_load() {
            return;
        }
        match self.backend.read(region.pos()) {
            Ok(snapshot) => {
                region.finish_load(snapshot);
                self.loads_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::error!("[ThreadedLoader] Failed to load region {}: {}", region.pos(), e);
                region.fail_load();
                self.loads_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn save(&self, region: &Region) {
        // A save can overtake the load it depends on; serve the load here
        self.ensure_loaded(region);
        if region.wait_until_loaded().is_err() {
            log::warn!(
                "[ThreadedLoader] Not saving region {}: its load failed and the stored copy is kept",
                region.pos()
            );
            return;
        }

        let snapshot = region.take_snapshot();
        match self.backend.write(&snapshot) {
            Ok(()) => {
                self.saves_completed.fetch_add(1, Ordering::Relaxed);
                log::trace!("[ThreadedLoader] Saved region {}", region.pos());
            }
            Err(e) => {
                self.saves_failed.fetch_add(1, Ordering::Relaxed);
                log::error!("[ThreadedLoader] Failed to save region {}: {}", region.pos(), e);
            }
        }
    }
}
