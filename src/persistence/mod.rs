//! Region persistence
//!
//! Storage formats and the threaded loader that serves the store's load and
//! save requests.
//!
//! # Region file layout
//!
//! ```text
//! [magic "TRGN"][format version u32 LE][crc32 of payload u32 LE][zlib payload]
//! ```
//!
//! The payload is a bincode-encoded [`RegionSnapshot`](crate::region::RegionSnapshot).

pub mod backend;
pub mod codec;
pub mod compression;
pub mod loader;

pub use backend::{atomic_write, FileBackend, MemoryBackend, RegionBackend};
pub use codec::RegionCodec;
pub use loader::{LoaderStats, ThreadedLoader};

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupted data: {0}")]
    Corrupted(String),
}
