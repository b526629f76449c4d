//! The in-memory hash cache and its load / update / dump lifecycle.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use rayon::prelude::*;
use walkdir::WalkDir;

use super::file::{read_cache, write_cache, CacheHeader};
use super::CacheError;
use crate::progress::{NoProgress, ProgressCallback, PHASE_HASHING, PHASE_LOADING};
use crate::scanner::{HashFunction, HashVector};

/// Default hashing pool size: available parallelism minus one, at least one.
#[must_use]
pub fn default_hash_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Newest modification time of anything under `dir`, the directory itself included.
///
/// The cache file at `cache_path` and its temporary sibling are skipped, and
/// so is the mtime of the directory holding them, since writing the cache
/// touches all three. Entries whose metadata cannot be read are skipped.
#[must_use]
pub fn newest_mtime(dir: &Path, cache_path: &Path) -> Option<SystemTime> {
    let cache_file = canonical_or_self(cache_path);
    let cache_tmp = cache_file.with_extension("zst.tmp");
    let cache_dir = cache_file.parent().map(Path::to_path_buf);

    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let path = entry.path();
                if path == cache_file || path == cache_tmp || Some(path) == cache_dir.as_deref() {
                    return None;
                }
                entry.metadata().ok()?.modified().ok()
            }
            Err(e) => {
                log::debug!("Skipping unreadable entry during mtime scan: {}", e);
                None
            }
        })
        .max()
}

/// `path` with its parent directory resolved, or `path` unchanged when the
/// parent does not exist yet.
fn canonical_or_self(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            std::fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Configuration for hash computation and persistence.
#[derive(Clone)]
pub struct CacheConfig {
    /// Whether the on-disk cache is read and written at all.
    pub enabled: bool,
    /// Size of the hashing worker pool.
    pub hash_threads: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress sink.
    pub progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("enabled", &self.enabled)
            .field("hash_threads", &self.hash_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress", &"<dyn ProgressCallback>")
            .finish()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_threads: default_hash_threads(),
            shutdown_flag: None,
            progress: Arc::new(NoProgress),
        }
    }
}

impl CacheConfig {
    /// Enable or disable the on-disk cache.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the hashing pool size (clamped to at least one).
    #[must_use]
    pub fn with_hash_threads(mut self, threads: usize) -> Self {
        self.hash_threads = threads.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Hash every path on a bounded worker pool.
///
/// A failure for an individual image is logged and replaced by the sentinel;
/// the result always has one entry per distinct input path. Results are keyed
/// by path, so completion order does not matter.
///
/// # Errors
///
/// - [`CacheError::Interrupted`] if the shutdown flag is raised; no partial
///   result is returned
/// - [`CacheError::ThreadPool`] if the worker pool cannot be created
pub fn compute_all(
    paths: &[PathBuf],
    hash_fn: &dyn HashFunction,
    config: &CacheConfig,
) -> Result<HashMap<PathBuf, HashVector>, CacheError> {
    let bits = hash_fn.bits();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.hash_threads.max(1))
        .build()?;

    log::info!(
        "Calculating image hashes (hash-bits={} num-proc={}) for {} image(s)",
        bits,
        config.hash_threads,
        paths.len()
    );
    config.progress.on_phase_start(PHASE_HASHING, paths.len());
    let done = AtomicUsize::new(0);

    let result: Result<Vec<(PathBuf, HashVector)>, CacheError> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                if config.is_shutdown_requested() {
                    return Err(CacheError::Interrupted);
                }

                let vector = match hash_fn.hash_image(path) {
                    Ok(v) if v.len() == bits => HashVector::Valid(v),
                    Ok(v) => {
                        log::warn!(
                            "Hash of {} has {} bits, expected {}; treating as failed",
                            path.display(),
                            v.len(),
                            bits
                        );
                        HashVector::failed(bits)
                    }
                    Err(e) => {
                        log::warn!("{}", e);
                        HashVector::failed(bits)
                    }
                };

                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                config
                    .progress
                    .on_progress(current, &path.to_string_lossy());
                Ok((path.clone(), vector))
            })
            .collect()
    });
    config.progress.on_phase_end(PHASE_HASHING);

    let hashed = result?;
    if config.is_shutdown_requested() {
        return Err(CacheError::Interrupted);
    }

    let failed = hashed.iter().filter(|(_, v)| v.is_failed()).count();
    if failed > 0 {
        log::warn!("{} image(s) could not be hashed and will not be grouped", failed);
    }
    Ok(hashed.into_iter().collect())
}

/// Owner of the path → hash vector mapping for one run.
///
/// Other components only get read views ([`entries`](Self::entries)) or
/// copies ([`vectors_for`](Self::vectors_for)). The mapping is tied to the
/// directory passed to [`load`](Self::load); that directory is written into
/// the cache header and a file recorded for another directory is never
/// reused.
pub struct HashCache {
    hash_fn: Arc<dyn HashFunction>,
    config: CacheConfig,
    target: PathBuf,
    entries: HashMap<PathBuf, HashVector>,
}

impl HashCache {
    /// Create an empty cache that hashes with `hash_fn`.
    #[must_use]
    pub fn new(hash_fn: Arc<dyn HashFunction>, config: CacheConfig) -> Self {
        Self {
            hash_fn,
            config,
            target: PathBuf::new(),
            entries: HashMap::new(),
        }
    }

    /// Header describing vectors produced by this cache's hash function for
    /// its target directory.
    #[must_use]
    pub fn header(&self) -> CacheHeader {
        CacheHeader::new(self.hash_fn.method_name(), self.hash_fn.bits(), &self.target)
    }

    /// Directory the mapping belongs to; empty until [`load`](Self::load).
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read view of the mapping.
    #[must_use]
    pub fn entries(&self) -> &HashMap<PathBuf, HashVector> {
        &self.entries
    }

    /// Vector for one path.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&HashVector> {
        self.entries.get(path)
    }

    /// Copies of the vectors for `paths`, in the same order.
    ///
    /// Paths missing from the cache get the sentinel.
    #[must_use]
    pub fn vectors_for(&self, paths: &[PathBuf]) -> Vec<HashVector> {
        let bits = self.hash_fn.bits();
        paths
            .iter()
            .map(|p| {
                self.entries
                    .get(p)
                    .cloned()
                    .unwrap_or_else(|| HashVector::failed(bits))
            })
            .collect()
    }

    /// Replace the mapping with freshly computed hashes for `paths`.
    ///
    /// # Errors
    ///
    /// See [`compute_all`].
    pub fn compute(&mut self, paths: &[PathBuf]) -> Result<(), CacheError> {
        self.entries = compute_all(paths, self.hash_fn.as_ref(), &self.config)?;
        Ok(())
    }

    /// Load the mapping from `cache_path` if it is still valid, else compute it.
    ///
    /// The file is reused only when caching is enabled, the file exists, its
    /// modification time is newer than everything under `target_dir`, its
    /// header matches this cache's hash function and `target_dir`, and it
    /// holds exactly as many entries as `paths`. Returns whether the file was
    /// reused.
    ///
    /// `target_dir` should be canonical: it is compared verbatim with the
    /// directory recorded in the file.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Corrupted`] if the file exists but cannot be decoded
    /// - any error from [`compute_all`]
    pub fn load(
        &mut self,
        cache_path: &Path,
        target_dir: &Path,
        paths: &[PathBuf],
    ) -> Result<bool, CacheError> {
        self.target = target_dir.to_path_buf();
        if self.config.enabled && cache_path.exists() && self.is_fresh(cache_path, target_dir) {
            self.config.progress.on_phase_start(PHASE_LOADING, 0);
            let loaded = read_cache(cache_path);
            self.config.progress.on_phase_end(PHASE_LOADING);
            let (header, entries) = loaded?;

            if header != self.header() {
                log::info!(
                    "Hash cache {} was built with {:?}, expected {:?}; recomputing",
                    cache_path.display(),
                    header,
                    self.header()
                );
            } else if entries.len() != paths.len() {
                log::info!(
                    "Hash cache {} holds {} entries for {} images; recomputing",
                    cache_path.display(),
                    entries.len(),
                    paths.len()
                );
            } else {
                log::debug!("Load hash cache: {}", cache_path.display());
                self.entries = entries;
                return Ok(true);
            }
        }

        self.compute(paths)?;
        Ok(false)
    }

    fn is_fresh(&self, cache_path: &Path, target_dir: &Path) -> bool {
        let cache_mtime = match std::fs::metadata(cache_path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Cannot stat cache {}: {}", cache_path.display(), e);
                return false;
            }
        };
        match newest_mtime(target_dir, cache_path) {
            Some(target_mtime) => {
                let fresh = cache_mtime > target_mtime;
                if !fresh {
                    log::info!(
                        "Hash cache {} is older than {}; recomputing",
                        cache_path.display(),
                        target_dir.display()
                    );
                }
                fresh
            }
            None => false,
        }
    }

    /// Reconcile the mapping with `current_paths`.
    ///
    /// Entries for vanished paths are dropped and only newly seen paths are
    /// hashed. Returns `false` when nothing was added or removed.
    ///
    /// # Errors
    ///
    /// See [`compute_all`].
    pub fn update_incremental(&mut self, current_paths: &[PathBuf]) -> Result<bool, CacheError> {
        let current: HashSet<&PathBuf> = current_paths.iter().collect();

        let removed: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|p| !current.contains(p))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let added: Vec<PathBuf> = current_paths
            .iter()
            .filter(|p| !self.entries.contains_key(*p) && seen.insert(*p))
            .cloned()
            .collect();

        if removed.is_empty() && added.is_empty() {
            log::debug!("Hash cache is up to date");
            return Ok(false);
        }

        log::info!(
            "Updating hash cache: {} removed, {} added",
            removed.len(),
            added.len()
        );
        let fresh = compute_all(&added, self.hash_fn.as_ref(), &self.config)?;
        for path in &removed {
            self.entries.remove(path);
        }
        self.entries.extend(fresh);
        Ok(true)
    }

    /// Persist the mapping to `cache_path`.
    ///
    /// Returns `false` without touching the filesystem when caching is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file cannot be written.
    pub fn dump(&self, cache_path: &Path) -> Result<bool, CacheError> {
        if !self.config.enabled {
            return Ok(false);
        }
        write_cache(cache_path, &self.header(), &self.entries)?;
        log::debug!("Dump hash cache: {}", cache_path.display());
        Ok(true)
    }
}
