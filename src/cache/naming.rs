//! File naming for hash caches and audit logs.
//!
//! Every name encodes the target directory (sanitized to a filesystem-safe
//! token), the hash method and either the hash bit-length (caches) or the
//! distance threshold (logs), so different configurations never collide.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;

/// Timestamp format used as the prefix of log file names.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Reduce a path to a token made of word characters, `-` and `.`.
///
/// Surrounding whitespace is trimmed and inner spaces become underscores.
///
/// ```
/// use imgdupes::cache::naming::sanitize_target;
/// use std::path::Path;
///
/// assert_eq!(sanitize_target(Path::new("my photos/2020")), "my_photos2020");
/// ```
#[must_use]
pub fn sanitize_target(path: &Path) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"(?u)[^-\w.]").expect("valid pattern"));

    let raw = path.to_string_lossy();
    let spaced = raw.trim().replace(' ', "_");
    invalid.replace_all(&spaced, "").into_owned()
}

/// Naming scheme for one run's cache and log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNames {
    /// `exact` or `ann`
    pub strategy_tag: &'static str,
    /// Sanitized target directory
    pub target: String,
    /// Hash method name
    pub method: String,
}

impl RunNames {
    /// Build the naming scheme for a target directory.
    #[must_use]
    pub fn new(target_dir: &Path, method: &str, approximate: bool) -> Self {
        Self {
            strategy_tag: if approximate { "ann" } else { "exact" },
            target: sanitize_target(target_dir),
            method: method.to_string(),
        }
    }

    /// Cache file name for vectors of `bits` length.
    #[must_use]
    pub fn cache_file(&self, bits: u32) -> String {
        format!(
            "hash_cache_{}_{}_{}_{}.json.zst",
            self.strategy_tag, self.target, self.method, bits
        )
    }

    /// Duplicate-sets log name, prefixed with `now`.
    #[must_use]
    pub fn duplicate_log(&self, threshold: u32, now: DateTime<Local>) -> String {
        format!(
            "{}_dup_{}_{}_{}_{}.log",
            now.format(LOG_TIMESTAMP_FORMAT),
            self.strategy_tag,
            self.target,
            self.method,
            threshold
        )
    }

    /// Delete log name, prefixed with `now`.
    #[must_use]
    pub fn delete_log(&self, threshold: u32, now: DateTime<Local>) -> String {
        format!(
            "{}_del_{}_{}_{}_{}.log",
            now.format(LOG_TIMESTAMP_FORMAT),
            self.strategy_tag,
            self.target,
            self.method,
            threshold
        )
    }
}
