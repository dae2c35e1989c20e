//! Error types shared across the region engine

use crate::region::RegionPos;

/// Errors surfaced by region lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("Region {pos} failed to load")]
    LoadFailed { pos: RegionPos },

    #[error("Region store has been dropped")]
    StoreDropped,

    #[error("Worker pool '{pool}' is shut down")]
    WorkerShutdown { pool: &'static str },

    #[error("Failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for region lifecycle operations
pub type RegionResult<T> = Result<T, RegionError>;
