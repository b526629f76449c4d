//! Scanner module for image discovery and perceptual hashing.
//!
//! - [`walker`]: Directory traversal and image discovery
//! - [`perceptual`]: Bit vectors, the failure sentinel and the hash capability
//!
//! # Example
//!
//! ```no_run
//! use imgdupes::scanner::{HashFunction, HashMethod, PerceptualHasher, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     recursive: true,
//!     ..Default::default()
//! };
//! let images = Walker::new(Path::new("."), config).collect_images().unwrap();
//!
//! let hasher = PerceptualHasher::new(HashMethod::Phash, 8).unwrap();
//! for image in &images {
//!     if let Ok(bits) = hasher.hash_image(image) {
//!         println!("{} {}", bits, image.display());
//!     }
//! }
//! ```

pub mod perceptual;
pub mod walker;

use std::path::PathBuf;

pub use perceptual::{
    BitVector, HashFunction, HashMethod, HashVector, PerceptualError, PerceptualHasher,
    HASH_SIZE_RANGE,
};
pub use walker::{is_image_path, Walker, IMAGE_EXTENSIONS};

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Descend into subdirectories.
    pub recursive: bool,

    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
