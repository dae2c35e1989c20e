// Terra Regions Constants - SINGLE SOURCE OF TRUTH
//
// World geometry and tuning defaults live here so the store, the streaming
// window and the persistence layer agree on region dimensions.

/// World geometry
pub mod geometry {
    /// Tiles along one side of a slice
    pub const SLICE_SIZE: i32 = 16;
    /// Slices along one side of a region
    pub const REGION_SLICES: i32 = 16;
    /// Tiles along one side of a region
    pub const REGION_TILES: i32 = SLICE_SIZE * REGION_SLICES;

    pub const TILES_PER_SLICE: usize = (SLICE_SIZE * SLICE_SIZE) as usize;
    pub const SLICES_PER_REGION: usize = (REGION_SLICES * REGION_SLICES) as usize;
}

/// Region store defaults
pub mod store {
    use std::time::Duration;

    pub const DEFAULT_STRIPE_COUNT: usize = 16;
    /// Ticks an unanchored region lingers before it is migrated to cache storage
    pub const DEFAULT_UNLOAD_DELAY_TICKS: u32 = 100;
    /// World-age ticks between autosaves of a modified region (~30s at 20 tps)
    pub const DEFAULT_AUTOSAVE_INTERVAL_TICKS: u64 = 600;
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Streaming window defaults
pub mod streaming {
    pub const DEFAULT_WINDOW_RADIUS: i32 = 4;
    pub const MAX_WINDOW_RADIUS: i32 = 32;
}

/// Persistence format
pub mod persistence {
    /// File magic for region files ("TRGN")
    pub const REGION_MAGIC: [u8; 4] = *b"TRGN";
    pub const REGION_FORMAT_VERSION: u32 = 1;
    pub const REGION_FILE_EXTENSION: &str = "region";
}
