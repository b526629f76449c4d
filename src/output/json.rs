//! JSON output for duplicate groups and query matches.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     { "id": 1, "files": ["/photos/a.jpg", "/photos/a_copy.jpg"] }
//!   ],
//!   "summary": {
//!     "total_images": 120,
//!     "failed_images": 1,
//!     "duplicate_sets": 1,
//!     "duplicate_images": 2,
//!     "hash_method": "phash",
//!     "hash_bits": 64,
//!     "threshold": 4,
//!     "backend": "exact",
//!     "used_cache": true,
//!     "duration_ms": 812,
//!     "exit_code": 0,
//!     "exit_code_name": "ID000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::RunSummary;
use crate::duplicates::{GroupTable, QueryMatch};
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Group id, dense from 1
    pub id: u32,
    /// Member paths
    pub files: Vec<String>,
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
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
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "ID000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Build from a run summary and the exit code of the run.
    #[must_use]
    pub fn from_run_summary(summary: &RunSummary, exit_code: ExitCode) -> Self {
        Self {
            total_images: summary.total_images,
            failed_images: summary.failed_images,
            duplicate_sets: summary.duplicate_sets,
            duplicate_images: summary.duplicate_images,
            hash_method: summary.hash_method.clone(),
            hash_bits: summary.hash_bits,
            threshold: summary.threshold,
            backend: summary.backend.clone(),
            used_cache: summary.used_cache,
            duration_ms: summary.duration.as_millis() as u64,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON document for a grouping run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate groups
    pub groups: Vec<JsonGroup>,
    /// Run statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the document.
    #[must_use]
    pub fn new(groups: &GroupTable, summary: &RunSummary, exit_code: ExitCode) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|(id, members)| JsonGroup {
                    id,
                    files: members
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect(),
                })
                .collect(),
            summary: JsonSummary::from_run_summary(summary, exit_code),
        }
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

/// JSON document for a query run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonQueryOutput {
    /// The external image
    pub query: String,
    /// Corpus images within the threshold
    pub matches: Vec<QueryMatch>,
}

impl JsonQueryOutput {
    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
