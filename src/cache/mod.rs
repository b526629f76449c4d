//! Persistent hash cache.
//!
//! Hashing is the dominant cost of a run, so computed vectors are kept in a
//! single compressed file per configuration and reused when safe.
//!
//! * [`store`]: [`HashCache`] - compute in parallel, load, update incrementally, dump.
//! * [`file`]: the on-disk envelope (zstd-compressed JSON with a SHA-256 checksum).
//! * [`naming`]: cache and log file names.
//!
//! # Cache Invalidation
//!
//! A cache file is reused only if its modification time is newer than every
//! file and directory under the target tree, it was built with the same hash
//! method and bit length, and it holds as many entries as there are images.
//! Anything else is a cold path: the hashes are recomputed. A file that exists
//! but cannot be decoded is an error, not a cold path.

pub mod file;
pub mod naming;
pub mod store;

use std::path::PathBuf;

pub use file::{read_cache, write_cache, CacheHeader, CACHE_VERSION};
pub use naming::{sanitize_target, RunNames};
pub use store::{compute_all, default_hash_threads, newest_mtime, CacheConfig, HashCache};

/// Errors from hash computation and cache persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Hashing was interrupted by a shutdown request.
    #[error("hashing interrupted")]
    Interrupted,

    /// The cache file exists but cannot be decoded.
    #[error("hash cache {path} is corrupted: {reason}")]
    Corrupted {
        /// Cache file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The cache file could not be read or written.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serialization of the cache envelope failed.
    #[error("failed to serialize hash cache: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The hashing worker pool could not be created.
    #[error("failed to start hashing workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
