use super::compression::{compress, decompress};
use super::{PersistenceError, PersistenceResult};
use crate::constants::geometry::SLICES_PER_REGION;
use crate::constants::persistence::{REGION_FORMAT_VERSION, REGION_MAGIC};
use crate::region::RegionSnapshot;

const HEADER_LEN: usize = 12;

/// Encodes region snapshots into the on-disk byte format
#[derive(Debug, Clone, Copy)]
pub struct RegionCodec {
    compression_level: u32,
}

impl Default for RegionCodec {
    fn default() -> Self {
        Self::new(6)
    }
}

impl RegionCodec {
    pub fn new(compression_level: u32) -> Self {
        Self {
            compression_level: compression_level.min(9),
        }
    }

    pub fn encode(&self, snapshot: &RegionSnapshot) -> PersistenceResult<Vec<u8>> {
        let raw = bincode::serialize(snapshot)?;
        let payload = compress(&raw, self.compression_level)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&REGION_MAGIC);
        bytes.extend_from_slice(&REGION_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&checksum(&payload).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> PersistenceResult<RegionSnapshot> {
        if bytes.len() < HEADER_LEN {
            return Err(PersistenceError::Corrupted(format!(
                "region file too short ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[0..4] != REGION_MAGIC {
            return Err(PersistenceError::Corrupted("bad magic".to_string()));
        }

        let version = read_u32(&bytes[4..8]);
        if version != REGION_FORMAT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: REGION_FORMAT_VERSION,
                found: version,
            });
        }

        let stored = read_u32(&bytes[8..12]);
        let payload = &bytes[HEADER_LEN..];
        let computed = checksum(payload);
        if stored != computed {
            return Err(PersistenceError::ChecksumMismatch { stored, computed });
        }

        let snapshot: RegionSnapshot = bincode::deserialize(&decompress(payload)?)?;
        validate(&snapshot)?;
        Ok(snapshot)
    }
}

fn validate(snapshot: &RegionSnapshot) -> PersistenceResult<()> {
    if snapshot.slices.len() != SLICES_PER_REGION {
        return Err(PersistenceError::Corrupted(format!(
            "region {} has {} slices, expected {}",
            snapshot.pos,
            snapshot.slices.len(),
            SLICES_PER_REGION
        )));
    }
    if let Some(index) = snapshot.slices.iter().position(|s| !s.is_well_formed()) {
        return Err(PersistenceError::Corrupted(format!(
            "region {} slice {} has a bad tile count",
            snapshot.pos, index
        )));
    }
    Ok(())
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}
