use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use terra_regions::constants::geometry::REGION_TILES;
use terra_regions::{
    EngineConfig, FileBackend, LocalTile, NoisePopulator, Region, RegionEngine, SharedTarget, StreamTarget,
    StreamingWindow, TileId, TilePos, WorldHooks,
};

/// World stand-in: a tick clock plus grass spreading onto soil
#[derive(Default)]
struct SoakWorld {
    age: AtomicU64,
    tile_updates: AtomicU64,
    unloads: AtomicU64,
}

impl WorldHooks for SoakWorld {
    fn world_age(&self) -> u64 {
        self.age.load(Ordering::Acquire)
    }

    fn on_region_unload(&self, region: &Region) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
        log::trace!("Unloading region {}", region.pos());
    }

    fn random_tile_update(&self, region: &Region, local: LocalTile) {
        if region.tile(local) == TileId::SOIL {
            region.set_tile(local, TileId::GRASS);
        }
        self.tile_updates.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };

    println!("Terra Regions - Streaming Soak Test");
    println!("===================================");
    println!("Save directory: {}", config.storage.save_dir.display());
    println!("Window radius: {}", config.streaming.radius);

    let world = Arc::new(SoakWorld::default());
    let backend = FileBackend::new(&config.storage.save_dir, config.storage.compression_level)?;
    let populator = Arc::new(NoisePopulator::new(config.storage.world_seed));
    let engine = RegionEngine::new(&config, world.clone(), backend, populator)?;

    let target = SharedTarget::new(TilePos::new(0, 0));
    let mut window = StreamingWindow::new(engine.store.clone(), target.clone(), config.streaming.radius);

    let started = Instant::now();
    let ticks = 600u64;
    for tick in 0..ticks {
        // Walk east at a quarter region per tick, then teleport once
        let pos = if tick == ticks / 2 {
            TilePos::new(50 * REGION_TILES, 50 * REGION_TILES)
        } else {
            target.tile_pos().offset(REGION_TILES / 4, 0)
        };
        target.set(pos);

        window.update();
        engine.store.update_regions();
        world.age.fetch_add(1, Ordering::AcqRel);

        if tick % 100 == 0 {
            let stats = engine.store.stats();
            log::info!(
                "tick {}: {} primary, {} cached, {} saves in flight, prepared: {}",
                tick,
                stats.primary,
                stats.cached,
                stats.saves_in_flight,
                engine.store.is_loaded()
            );
        }
        thread::sleep(Duration::from_millis(5));
    }

    window.unload();
    let clean = engine.shutdown();

    let loader = engine.loader.stats();
    let generation = engine.generator.stats();
    println!("\nSoak finished in {:.2}s", started.elapsed().as_secs_f64());
    println!("  Regions generated: {}", generation.regions_generated);
    println!("  Loads: {} ok, {} failed", loader.loads_completed, loader.loads_failed);
    println!("  Saves: {} ok, {} failed", loader.saves_completed, loader.saves_failed);
    println!("  Random tile updates: {}", world.tile_updates.load(Ordering::Relaxed));
    println!("  Region unloads: {}", world.unloads.load(Ordering::Relaxed));

    if !clean {
        anyhow::bail!("cached regions were still saving at shutdown");
    }
    Ok(())
}
