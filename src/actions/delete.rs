//! File removal for members the user chose not to keep.
//!
//! # Overview
//!
//! Files are unlinked permanently by default, or moved to the platform
//! trash with [`DeleteConfig::trash`]. A file that has already disappeared
//! is not an error: it is reported as [`DeleteOutcome::AlreadyGone`] and
//! the batch carries on.
//!
//! # Example
//!
//! ```no_run
//! use imgdupes::actions::delete::{delete_file, DeleteConfig, DeleteOutcome};
//! use std::path::Path;
//!
//! match delete_file(Path::new("/photos/copy.jpg"), &DeleteConfig::permanent()) {
//!     Ok(DeleteOutcome::Removed(r)) => println!("freed {} bytes", r.size),
//!     Ok(DeleteOutcome::AlreadyGone(p)) => println!("{} was already gone", p.display()),
//!     Err(e) => eprintln!("Failed: {}", e),
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for deletion operations.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Permission denied when attempting to delete.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File that could not be trashed
        path: PathBuf,
        /// Message from the trash backend
        message: String,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File that could not be removed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// Path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p) | Self::TrashFailed { path: p, .. } | Self::Io { path: p, .. } => p,
        }
    }

    fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: e,
            },
        }
    }
}

/// A completed removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    /// Removed path
    pub path: PathBuf,
    /// Size of the file before removal
    pub size: u64,
    /// Whether it was unlinked (true) or trashed (false)
    pub permanent: bool,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file was removed.
    Removed(DeleteResult),
    /// The file did not exist any more.
    AlreadyGone(PathBuf),
}

/// How files are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteConfig {
    /// Move to the platform trash instead of unlinking.
    pub use_trash: bool,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self::permanent()
    }
}

impl DeleteConfig {
    /// Unlink files.
    #[must_use]
    pub fn permanent() -> Self {
        Self { use_trash: false }
    }

    /// Move files to the trash.
    #[must_use]
    pub fn trash() -> Self {
        Self { use_trash: true }
    }
}

/// Remove one file.
///
/// # Errors
///
/// - [`DeleteError::PermissionDenied`] if removal is not allowed
/// - [`DeleteError::TrashFailed`] if the trash backend refuses the file
/// - [`DeleteError::Io`] for other I/O failures
pub fn delete_file(path: &Path, config: &DeleteConfig) -> Result<DeleteOutcome, DeleteError> {
    let size = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("File not found, skipping: {}", path.display());
            return Ok(DeleteOutcome::AlreadyGone(path.to_path_buf()));
        }
        Err(e) => return Err(DeleteError::from_io(path, e)),
    };

    if config.use_trash {
        trash::delete(path).map_err(|e| {
            log::error!("Trash operation failed for {}: {}", path.display(), e);
            DeleteError::TrashFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        log::info!("Moved to trash: {} ({} bytes)", path.display(), size);
    } else {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("File vanished before removal: {}", path.display());
                return Ok(DeleteOutcome::AlreadyGone(path.to_path_buf()));
            }
            Err(e) => {
                log::error!("Delete failed for {}: {}", path.display(), e);
                return Err(DeleteError::from_io(path, e));
            }
        }
        log::info!("Deleted: {} ({} bytes)", path.display(), size);
    }

    Ok(DeleteOutcome::Removed(DeleteResult {
        path: path.to_path_buf(),
        size,
        permanent: !config.use_trash,
    }))
}

/// Results of removing several files.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteResult {
    /// Removed files.
    pub successes: Vec<DeleteResult>,
    /// Files that were already gone.
    pub missing: Vec<PathBuf>,
    /// Files that could not be removed, with the error message.
    pub failures: Vec<(PathBuf, String)>,
    /// Total bytes freed.
    pub bytes_freed: u64,
}

impl BatchDeleteResult {
    /// Number of removed files.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Number of failed removals.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold one outcome into the totals.
    pub fn record(&mut self, path: &Path, outcome: Result<DeleteOutcome, DeleteError>) {
        match outcome {
            Ok(DeleteOutcome::Removed(r)) => {
                self.bytes_freed += r.size;
                self.successes.push(r);
            }
            Ok(DeleteOutcome::AlreadyGone(p)) => self.missing.push(p),
            Err(e) => self.failures.push((path.to_path_buf(), e.to_string())),
        }
    }

    /// Merge another batch into this one.
    pub fn extend(&mut self, other: BatchDeleteResult) {
        self.successes.extend(other.successes);
        self.missing.extend(other.missing);
        self.failures.extend(other.failures);
        self.bytes_freed += other.bytes_freed;
    }
}

/// Remove every path, continuing past failures.
#[must_use]
pub fn delete_batch(paths: &[PathBuf], config: &DeleteConfig) -> BatchDeleteResult {
    let mut result = BatchDeleteResult::default();
    for path in paths {
        result.record(path, delete_file(path, config));
    }
    if !result.all_succeeded() {
        log::warn!(
            "{} of {} deletion(s) failed",
            result.failure_count(),
            paths.len()
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_permanent_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"12345").unwrap();

        let outcome = delete_file(&path, &DeleteConfig::permanent()).unwrap();
        assert_eq!(
            outcome,
            DeleteOutcome::Removed(DeleteResult {
                path: path.clone(),
                size: 5,
                permanent: true,
            })
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.png");

        let outcome = delete_file(&path, &DeleteConfig::permanent()).unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyGone(path.clone()));

        let outcome = delete_file(&path, &DeleteConfig::trash()).unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyGone(path));
    }

    #[test]
    fn test_delete_directory_fails() {
        let dir = tempdir().unwrap();
        let result = delete_file(dir.path(), &DeleteConfig::permanent());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().path(), dir.path());
    }

    #[test]
    fn test_batch_counts() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, b"aa").unwrap();
        fs::write(&b, b"bbb").unwrap();
        let gone = dir.path().join("gone.png");

        let result = delete_batch(&[a, gone.clone(), b], &DeleteConfig::default());
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.missing, vec![gone]);
        assert_eq!(result.bytes_freed, 5);
        assert!(result.all_succeeded());
    }

    #[test]
    fn test_batch_extend() {
        let mut total = BatchDeleteResult::default();
        let mut other = BatchDeleteResult::default();
        other.bytes_freed = 10;
        other.failures.push((PathBuf::from("x"), "boom".to_string()));
        total.extend(other);
        assert_eq!(total.bytes_freed, 10);
        assert_eq!(total.failure_count(), 1);
    }
}
