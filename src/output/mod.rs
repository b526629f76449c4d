//! Output of grouping results when not deleting.
//!
//! - [`text`]: one block (or line) per group, as the duplicate log stores them
//! - [`json`]: groups plus run statistics for scripting

pub mod json;
pub mod text;

use std::time::Duration;

pub use json::{JsonOutput, JsonOutputError, JsonQueryOutput};
pub use text::{write_groups, write_query_matches};

/// Output format for printed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Statistics of one grouping run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Images found under the target directory
    pub total_images: usize,
    /// Images whose hash could not be computed
    pub failed_images: usize,
    /// Number of duplicate groups
    pub duplicate_sets: usize,
    /// Images that belong to some group
    pub duplicate_images: usize,
    /// Hash method name
    pub hash_method: String,
    /// Hash length in bits
    pub hash_bits: u32,
    /// Hamming distance threshold
    pub threshold: u32,
    /// Neighbor search backend
    pub backend: String,
    /// Whether hashes came from the cache file
    pub used_cache: bool,
    /// Wall time of the run
    pub duration: Duration,
}
