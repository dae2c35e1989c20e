use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{PersistenceError, PersistenceResult};

/// Compress with zlib at `level` (0 stores, 9 is smallest)
pub fn compress(data: &[u8], level: u32) -> PersistenceResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| PersistenceError::Compression(format!("Zlib compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PersistenceError::Compression(format!("Zlib finalization failed: {}", e)))
}

pub fn decompress(data: &[u8]) -> PersistenceResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| PersistenceError::Compression(format!("Zlib decompression failed: {}", e)))?;
    Ok(decompressed)
}
