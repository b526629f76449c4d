//! On-disk format of the hash cache.
//!
//! A cache file is a zstd-compressed JSON envelope:
//!
//! ```json
//! {
//!   "version": 2,
//!   "hash_method": "phash",
//!   "hash_bits": 64,
//!   "target": "/home/me/pictures",
//!   "checksum": "<sha256 of the compact entries JSON>",
//!   "entries": [ { "path": "...", "vector": { "Valid": { ... } } } ]
//! }
//! ```
//!
//! Files are written to a sibling temporary path and renamed into place, so a
//! reader never observes a half-written cache.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheError;
use crate::scanner::HashVector;

/// Current cache format version.
pub const CACHE_VERSION: u32 = 2;

/// zstd compression level for cache blobs.
const COMPRESSION_LEVEL: i32 = 3;

/// Identifies the configuration a cache was computed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    /// Format version
    pub version: u32,
    /// Hash method name
    pub hash_method: String,
    /// Vector length in bits
    pub hash_bits: u32,
    /// Canonical directory the entries were collected from
    pub target: PathBuf,
}

impl CacheHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new(hash_method: &str, hash_bits: u32, target: &Path) -> Self {
        Self {
            version: CACHE_VERSION,
            hash_method: hash_method.to_string(),
            hash_bits,
            target: target.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    path: PathBuf,
    vector: HashVector,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    #[serde(flatten)]
    header: CacheHeader,
    checksum: String,
    entries: Vec<CacheRecord>,
}

fn checksum(records: &[CacheRecord]) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(records)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn corrupted(path: &Path, reason: impl ToString) -> CacheError {
    CacheError::Corrupted {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize and write a cache file.
///
/// Records are sorted by path so identical mappings produce identical files.
///
/// # Errors
///
/// Returns [`CacheError::Io`] if the file cannot be written.
pub fn write_cache(
    path: &Path,
    header: &CacheHeader,
    entries: &HashMap<PathBuf, HashVector>,
) -> Result<(), CacheError> {
    let mut records: Vec<CacheRecord> = entries
        .iter()
        .map(|(path, vector)| CacheRecord {
            path: path.clone(),
            vector: vector.clone(),
        })
        .collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));

    let envelope = CacheEnvelope {
        header: header.clone(),
        checksum: checksum(&records)?,
        entries: records,
    };
    let json = serde_json::to_vec(&envelope)?;

    let mut encoder =
        zstd::stream::Encoder::new(Vec::new(), COMPRESSION_LEVEL).map_err(|e| io_error(path, e))?;
    encoder.write_all(&json).map_err(|e| io_error(path, e))?;
    let compressed = encoder.finish().map_err(|e| io_error(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let tmp_path = path.with_extension("zst.tmp");
    fs::write(&tmp_path, &compressed).map_err(|e| io_error(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    log::debug!(
        "Wrote {} cache entries ({} bytes) to {}",
        envelope.entries.len(),
        compressed.len(),
        path.display()
    );
    Ok(())
}

/// Read and verify a cache file.
///
/// # Errors
///
/// - [`CacheError::Io`] if the file cannot be read
/// - [`CacheError::Corrupted`] if it cannot be decompressed, parsed, or its
///   checksum does not match
pub fn read_cache(
    path: &Path,
) -> Result<(CacheHeader, HashMap<PathBuf, HashVector>), CacheError> {
    let compressed = fs::read(path).map_err(|e| io_error(path, e))?;

    let mut decoder =
        zstd::stream::Decoder::new(compressed.as_slice()).map_err(|e| corrupted(path, e))?;
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| corrupted(path, e))?;

    let envelope: CacheEnvelope =
        serde_json::from_slice(&json).map_err(|e| corrupted(path, e))?;

    let expected = checksum(&envelope.entries)?;
    if expected != envelope.checksum {
        return Err(corrupted(path, "checksum mismatch"));
    }

    let entries = envelope
        .entries
        .into_iter()
        .map(|record| (record.path, record.vector))
        .collect();
    Ok((envelope.header, entries))
}
