use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::codec::RegionCodec;
use super::PersistenceResult;
use crate::constants::persistence::REGION_FILE_EXTENSION;
use crate::region::{RegionPos, RegionSnapshot};

/// Durable storage for region snapshots
pub trait RegionBackend: Send + Sync + 'static {
    /// `Ok(None)` when the region was never saved
    fn read(&self, pos: RegionPos) -> PersistenceResult<Option<RegionSnapshot>>;

    fn write(&self, snapshot: &RegionSnapshot) -> PersistenceResult<()>;
}

/// Write to a sibling temp file, then rename over the target
pub fn atomic_write(path: &Path, data: &[u8]) -> PersistenceResult<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// One file per region under a directory
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    codec: RegionCodec,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>, compression_level: u32) -> PersistenceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::info!("[FileBackend] Storing regions in {}", dir.display());
        Ok(Self {
            dir,
            codec: RegionCodec::new(compression_level),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_path(&self, pos: RegionPos) -> PathBuf {
        self.dir
            .join(format!("r.{}.{}.{}", pos.x, pos.y, REGION_FILE_EXTENSION))
    }
}

impl RegionBackend for FileBackend {
    fn read(&self, pos: RegionPos) -> PersistenceResult<Option<RegionSnapshot>> {
        let bytes = match fs::read(self.region_path(pos)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.codec.decode(&bytes).map(Some)
    }

    fn write(&self, snapshot: &RegionSnapshot) -> PersistenceResult<()> {
        let bytes = self.codec.encode(snapshot)?;
        atomic_write(&self.region_path(snapshot.pos), &bytes)
    }
}

/// Encoded snapshots kept in a map; for tests and throwaway worlds
#[derive(Debug, Default)]
pub struct MemoryBackend {
    codec: RegionCodec,
    files: Mutex<FxHashMap<RegionPos, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, pos: RegionPos) -> bool {
        self.files.lock().contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// Overwrite the stored bytes for `pos` directly
    pub fn insert_raw(&self, pos: RegionPos, bytes: Vec<u8>) {
        self.files.lock().insert(pos, bytes);
    }
}

impl RegionBackend for MemoryBackend {
    fn read(&self, pos: RegionPos) -> PersistenceResult<Option<RegionSnapshot>> {
        match self.files.lock().get(&pos) {
            Some(bytes) => self.codec.decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn write(&self, snapshot: &RegionSnapshot) -> PersistenceResult<()> {
        let bytes = self.codec.encode(snapshot)?;
        self.files.lock().insert(snapshot.pos, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{empty_slices, Slice, TileId};
    use tempfile::TempDir;

    fn snapshot(pos: RegionPos) -> RegionSnapshot {
        let mut slices = empty_slices();
        slices[0] = Slice::filled(TileId::GRASS);
        RegionSnapshot {
            pos,
            generated: true,
            slices,
            deferred: Vec::new(),
        }
    }

    #[test]
    fn test_file_backend_missing_region_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path(), 6).unwrap();
        assert!(backend.read(RegionPos::new(0, 0)).unwrap().is_none());
    }

    #[test]
    fn test_file_backend_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path().join("regions"), 1).unwrap();
        let pos = RegionPos::new(-2, 7);

        backend.write(&snapshot(pos)).unwrap();
        assert!(backend.region_path(pos).exists());
        assert!(!backend.region_path(pos).with_extension("tmp").exists());

        let loaded = backend.read(pos).unwrap().unwrap();
        assert_eq!(loaded.pos, pos);
        assert_eq!(loaded.slices[0], Slice::filled(TileId::GRASS));
    }

    #[test]
    fn test_file_backend_reports_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path(), 6).unwrap();
        let pos = RegionPos::new(1, 1);
        fs::write(backend.region_path(pos), b"garbage bytes here").unwrap();
        assert!(backend.read(pos).is_err());
    }

    #[test]
    fn test_memory_backend_overwrites() {
        let backend = MemoryBackend::new();
        let pos = RegionPos::new(0, 0);
        backend.write(&snapshot(pos)).unwrap();
        let mut second = snapshot(pos);
        second.generated = false;
        backend.write(&second).unwrap();

        assert_eq!(backend.len(), 1);
        assert!(!backend.read(pos).unwrap().unwrap().generated);
    }
}
