//! Audit trail: the duplicate sets of a run and the files it deleted.
//!
//! Both logs are plain text, one path per line, named by
//! [`RunNames`](crate::cache::RunNames) with a timestamp prefix so runs never
//! overwrite each other.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::cache::RunNames;
use crate::duplicates::GroupTable;

/// Errors while writing an audit log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The log file could not be written.
    #[error("failed to write log {path}: {source}")]
    Io {
        /// Log file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Render groups the way the duplicate log stores them.
///
/// Each group is a block of newline-separated paths, or a single
/// space-separated line when `same_line` is set.
#[must_use]
pub fn render_groups(groups: &GroupTable, same_line: bool) -> String {
    let mut out = String::new();
    for (_, members) in groups.iter() {
        let paths: Vec<String> = members.iter().map(|p| p.display().to_string()).collect();
        if same_line {
            out.push_str(&paths.join(" "));
        } else {
            out.push_str(&paths.join("\n"));
        }
        out.push('\n');
    }
    out
}

fn write_lines(path: &Path, content: &str) -> Result<(), AuditError> {
    let io_err = |source: io::Error| AuditError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = fs::File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content.as_bytes()).map_err(io_err)?;
    writer.flush().map_err(io_err)
}

/// Writer for the two audit logs of one run.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
    names: RunNames,
    threshold: u32,
    started: DateTime<Local>,
}

impl AuditLog {
    /// Logs go to `dir`, stamped with `started`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, names: RunNames, threshold: u32, started: DateTime<Local>) -> Self {
        Self {
            dir: dir.into(),
            names,
            threshold,
            started,
        }
    }

    /// Write the duplicate-sets log.
    ///
    /// Returns `None` without creating a file when there are no groups.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be written.
    pub fn write_duplicates(
        &self,
        groups: &GroupTable,
        same_line: bool,
    ) -> Result<Option<PathBuf>, AuditError> {
        if groups.is_empty() {
            return Ok(None);
        }
        let path = self
            .dir
            .join(self.names.duplicate_log(self.threshold, self.started));
        write_lines(&path, &render_groups(groups, same_line))?;
        log::info!("Duplicate sets written to {}", path.display());
        Ok(Some(path))
    }

    /// Write the delete log.
    ///
    /// Returns `None` without creating a file when nothing was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be written.
    pub fn write_deletions(&self, deleted: &[PathBuf]) -> Result<Option<PathBuf>, AuditError> {
        if deleted.is_empty() {
            return Ok(None);
        }
        let path = self
            .dir
            .join(self.names.delete_log(self.threshold, self.started));
        let content: String = deleted
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        write_lines(&path, &content)?;
        log::info!("Deleted files written to {}", path.display());
        Ok(Some(path))
    }
}
