//! Image discovery using jwalk for parallel traversal.
//!
//! The walker yields every regular file under the target directory whose
//! extension is a supported image format. Children of each directory are
//! sorted by name, so enumeration order is stable across runs; that order
//! is the "original path enumeration order" used to break sort ties.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::WalkDir;

use super::{ScanError, WalkerConfig};

/// Extensions (lowercase) recognised as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Whether `path` has a supported image extension (case-insensitive).
#[must_use]
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Directory walker for image discovery.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use imgdupes::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let images: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// ```
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop iteration as soon as the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the tree, yielding image paths in deterministic order.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, ScanError>> + '_ {
        let mut walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _read_dir_state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });
        if !self.config.recursive {
            walk_dir = walk_dir.max_depth(1);
        }

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    let file_type = entry.file_type();

                    if file_type.is_dir() {
                        return None;
                    }
                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }
                    if !is_image_path(&path) {
                        log::trace!("Skipping non-image file: {}", path.display());
                        return None;
                    }
                    Some(Ok(path))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }

    /// Collect all image paths, logging and skipping unreadable entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or is not a directory.
    pub fn collect_images(&self) -> Result<Vec<PathBuf>, ScanError> {
        if !self.root.exists() {
            return Err(ScanError::NotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let images: Vec<PathBuf> = self.walk().filter_map(Result::ok).collect();
        log::debug!(
            "Found {} image(s) under {}",
            images.len(),
            self.root.display()
        );
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a.jpg")));
        assert!(is_image_path(Path::new("a.JPEG")));
        assert!(is_image_path(Path::new("dir/b.png")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("no_extension")));
    }

    #[test]
    fn test_walk_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.png");
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "readme.txt");

        let walker = Walker::new(
            dir.path(),
            WalkerConfig {
                recursive: true,
                ..Default::default()
            },
        );
        let images = walker.collect_images().unwrap();

        assert_eq!(
            images,
            vec![dir.path().join("a.jpg"), dir.path().join("b.png")]
        );
    }

    #[test]
    fn test_non_recursive_skips_subdirectories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "top.png");
        touch(dir.path(), "sub/nested.png");

        let flat = Walker::new(dir.path(), WalkerConfig::default())
            .collect_images()
            .unwrap();
        assert_eq!(flat, vec![dir.path().join("top.png")]);

        let deep = Walker::new(
            dir.path(),
            WalkerConfig {
                recursive: true,
                ..Default::default()
            },
        )
        .collect_images()
        .unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_missing_root() {
        let walker = Walker::new(Path::new("/definitely/not/here"), WalkerConfig::default());
        assert!(matches!(
            walker.collect_images(),
            Err(ScanError::NotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_stops_walk() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.png");
        let flag = Arc::new(AtomicBool::new(true));

        let walker = Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(flag);
        assert_eq!(walker.walk().count(), 0);
    }
}
