//! Near-duplicate grouping.
//!
//! # Overview
//!
//! Images whose hash vectors lie within a Hamming-distance threshold of each
//! other are linked, and every connected component of two or more images is
//! one duplicate group. Linking is transitive: if A~B and B~C then A, B and C
//! share a group even when A and C are far apart.
//!
//! - [`union_find`]: the disjoint-set forest that accumulates links.
//! - [`index`]: neighbor indexes for the approximate strategy.
//! - [`engine`]: [`GroupingEngine`], which runs a strategy and emits a
//!   [`GroupTable`].
//!
//! # Example
//!
//! ```
//! use imgdupes::duplicates::{GroupingConfig, GroupingEngine};
//! use imgdupes::scanner::{BitVector, HashVector};
//! use std::path::PathBuf;
//!
//! let paths: Vec<PathBuf> = ["a", "b", "c", "d"].iter().map(PathBuf::from).collect();
//! let vectors: Vec<HashVector> = ["0000", "0001", "1110", "1111"]
//!     .iter()
//!     .map(|s| HashVector::from(s.parse::<BitVector>().unwrap()))
//!     .collect();
//!
//! let engine = GroupingEngine::new(GroupingConfig::default().with_threshold(1));
//! let table = engine.group(&paths, &vectors).unwrap();
//! assert_eq!(table.duplicate_set_count(), 2);
//! ```

pub mod engine;
pub mod index;
pub mod union_find;

pub use engine::{GroupTable, GroupingConfig, GroupingEngine, QueryMatch, Strategy};
pub use index::{Backend, BkTreeIndex, IndexParams, MihIndex, Neighbor, NeighborIndex};
pub use union_find::DisjointSets;

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

/// Errors from index construction and grouping.
#[derive(Debug, thiserror::Error)]
pub enum GroupingError {
    /// The requested neighbor search backend does not exist in this build.
    #[error("Unable to load backend '{name}'{}; available backends: {available}", suggestion_hint(.suggestion))]
    BackendUnavailable {
        /// Requested name
        name: String,
        /// Comma-separated available names
        available: String,
        /// Closest available name, if any is close
        suggestion: Option<String>,
    },

    /// The exact backend was asked to build an index.
    #[error("the exact backend does not build an index")]
    NoIndex,

    /// Valid vectors of different lengths were given to an index.
    #[error("hash vectors differ in length: expected {expected} bits, found {found}")]
    InconsistentLength {
        /// Length of the first valid vector
        expected: u32,
        /// Offending length
        found: u32,
    },

    /// Path and vector lists are not parallel.
    #[error("{paths} paths but {vectors} hash vectors")]
    LengthMismatch {
        /// Number of paths
        paths: usize,
        /// Number of vectors
        vectors: usize,
    },

    /// A worker pool could not be created.
    #[error("failed to start index workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Grouping was interrupted by a shutdown request.
    #[error("grouping interrupted")]
    Interrupted,
}
