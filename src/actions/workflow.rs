//! The preserve workflow: list, decide and delete, one group at a time.
//!
//! For every group the members are inspected and sorted, listed as
//!
//! ```text
//! [1]    12.34 kbyte   640x480 /photos/a.jpg
//! [2]     6.10 kbyte   320x240 /photos/b.jpg
//!
//! Set 1 of 3, preserve files [1 - 2, all, none]:
//! ```
//!
//! and after the decision each member is echoed as `[+]` (kept) or `[-]`
//! (deleted, or a delete candidate in a dry run). Groups are visited in the
//! order given; callers pass a canonicalized table for reproducible runs.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use yansi::Paint;

use super::delete::{delete_file, BatchDeleteResult, DeleteConfig};
use super::prompt::{DecisionSource, PromptError};
use super::sort::{sort_group_members, MemberInfo, SortCriterion};
use crate::duplicates::GroupTable;

/// Errors that stop the workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The decision source failed. Groups decided before it are in `report`,
    /// deletions included.
    #[error("{source}")]
    Prompt {
        /// What went wrong
        source: PromptError,
        /// Work done before the failure
        report: Box<WorkflowReport>,
    },
}

impl WorkflowError {
    /// What the workflow did before it stopped.
    #[must_use]
    pub fn partial_report(&self) -> &WorkflowReport {
        match self {
            Self::Prompt { report, .. } => report,
        }
    }
}

/// How the workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Every group was decided.
    #[default]
    Finished,
    /// Input ended before every group was decided.
    EndOfInput,
    /// A shutdown was requested; the current group was abandoned.
    Interrupted,
}

/// Result of one workflow run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowReport {
    /// Members chosen for deletion, in decision order
    pub delete_candidates: Vec<PathBuf>,
    /// Outcome of the deletions actually executed
    pub deletions: BatchDeleteResult,
    /// Bytes the candidates occupied when listed
    pub candidate_bytes: u64,
    /// Groups that received a decision
    pub groups_decided: usize,
    /// How the run ended
    pub completion: Completion,
    /// Whether files were really deleted
    pub executed: bool,
}

impl WorkflowReport {
    /// Paths actually removed.
    #[must_use]
    pub fn deleted_paths(&self) -> Vec<PathBuf> {
        self.deletions
            .successes
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.executed {
            format!(
                "{} file(s) deleted, {} reclaimed",
                self.deletions.success_count(),
                bytesize::ByteSize::b(self.deletions.bytes_freed)
            )
        } else {
            format!(
                "{} file(s) would be deleted, {} would be reclaimed (dry run, use --run to delete)",
                self.delete_candidates.len(),
                bytesize::ByteSize::b(self.candidate_bytes)
            )
        }
    }
}

/// Options for [`PreserveWorkflow`].
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Member sort key
    pub sort: SortCriterion,
    /// Flip the key's natural direction
    pub reverse: bool,
    /// Actually delete (otherwise dry run)
    pub run: bool,
    /// How files are removed
    pub delete: DeleteConfig,
    /// Warn when a group spans several directories
    pub print_warning: bool,
    /// Colorize the listing
    pub color: bool,
    /// Optional shutdown flag
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            sort: SortCriterion::Size,
            reverse: false,
            run: false,
            delete: DeleteConfig::default(),
            print_warning: false,
            color: false,
            shutdown_flag: None,
        }
    }
}

impl WorkflowConfig {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Parent directories of `members`, in first-seen order, if there is more than one.
#[must_use]
pub fn distinct_parents(members: &[MemberInfo]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let parents: Vec<PathBuf> = members
        .iter()
        .filter_map(|m| m.path.parent().map(Path::to_path_buf))
        .filter(|p| seen.insert(p.clone()))
        .collect();
    if parents.len() > 1 {
        parents
    } else {
        Vec::new()
    }
}

/// Listing line for member `index` (1-based).
#[must_use]
pub fn listing_line(index: usize, member: &MemberInfo) -> String {
    format!(
        "[{}] {:>8.2} kbyte {:>9} {}",
        index,
        member.size as f64 / 1024.0,
        member.dimensions_label(),
        member.path.display()
    )
}

/// Best-effort sink for the listing.
///
/// The first write error is logged and every later write is skipped, so a
/// closed stdout never stops decisions or deletions.
struct Listing<'a, W: Write> {
    out: &'a mut W,
    broken: bool,
}

impl<'a, W: Write> Listing<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self { out, broken: false }
    }

    fn put(&mut self, args: fmt::Arguments<'_>) {
        if self.broken {
            return;
        }
        if let Err(e) = self.out.write_fmt(args) {
            self.broken = true;
            log::warn!("Cannot write the duplicate listing ({}); continuing without it", e);
        }
    }

    fn flush(&mut self) {
        if self.broken {
            return;
        }
        if let Err(e) = self.out.flush() {
            self.broken = true;
            log::warn!("Cannot write the duplicate listing ({}); continuing without it", e);
        }
    }
}

/// Runs the preserve workflow over a group table.
#[derive(Debug, Clone, Default)]
pub struct PreserveWorkflow {
    config: WorkflowConfig,
}

impl PreserveWorkflow {
    /// Create a workflow.
    #[must_use]
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Members of one group, inspected and sorted.
    #[must_use]
    pub fn order_group(&self, members: &[PathBuf]) -> Vec<MemberInfo> {
        let infos = members.iter().map(|p| MemberInfo::inspect(p)).collect();
        sort_group_members(infos, self.config.sort, self.config.reverse)
    }

    /// Visit every group of `groups`, asking `decider` what to delete.
    ///
    /// Deletions are executed per group as soon as it is decided, so an
    /// interruption leaves earlier groups' deletions in place and the
    /// current group untouched. Failing to write the listing to `out` is
    /// logged once and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Prompt`] if the decision source fails; it
    /// carries the report of the groups handled so far.
    pub fn run<D, W>(
        &self,
        groups: &GroupTable,
        decider: &mut D,
        out: &mut W,
    ) -> Result<WorkflowReport, WorkflowError>
    where
        D: DecisionSource + ?Sized,
        W: Write,
    {
        let total = groups.duplicate_set_count();
        let mut report = WorkflowReport {
            executed: self.config.run,
            ..WorkflowReport::default()
        };
        let mut listing = Listing::new(out);

        for (position, (_, members)) in groups.iter().enumerate() {
            if self.config.is_shutdown_requested() {
                report.completion = Completion::Interrupted;
                break;
            }

            let ordered = self.order_group(members);
            self.warn_mixed_parents(&ordered);

            for (i, member) in ordered.iter().enumerate() {
                listing.put(format_args!("{}\n", listing_line(i + 1, member)));
            }
            listing.put(format_args!("\nSet {} of {}, ", position + 1, total));
            listing.flush();

            let decision = match decider.decide(ordered.len()) {
                Ok(decision) => decision,
                Err(source) => {
                    return Err(WorkflowError::Prompt {
                        source,
                        report: Box::new(report),
                    })
                }
            };
            let Some(delete) = decision else {
                listing.put(format_args!("\n"));
                report.completion = if self.config.is_shutdown_requested() {
                    Completion::Interrupted
                } else {
                    Completion::EndOfInput
                };
                log::warn!("Decision for set {} of {} abandoned", position + 1, total);
                break;
            };
            log::debug!("delete list: {:?}", delete);
            report.groups_decided += 1;

            self.apply(&ordered, &delete, &mut report, &mut listing);
        }
        listing.flush();

        if !self.config.run {
            log::debug!("dry-run, delete candidates: {:?}", report.delete_candidates);
        }
        Ok(report)
    }

    fn warn_mixed_parents(&self, ordered: &[MemberInfo]) {
        if !self.config.print_warning {
            return;
        }
        let parents = distinct_parents(ordered);
        if !parents.is_empty() {
            let listed: Vec<String> = parents.iter().map(|p| p.display().to_string()).collect();
            log::warn!(
                "Similar images are stored in different subdirectories:\n{}",
                listed.join("\n")
            );
        }
    }

    fn apply<W: Write>(
        &self,
        ordered: &[MemberInfo],
        delete: &[usize],
        report: &mut WorkflowReport,
        listing: &mut Listing<'_, W>,
    ) {
        let delete: BTreeSet<usize> = delete.iter().copied().collect();
        listing.put(format_args!("\n"));
        for (i, member) in ordered.iter().enumerate() {
            if delete.contains(&(i + 1)) {
                listing.put(format_args!("   {} {}\n", self.paint_minus(), member.path.display()));
                report.delete_candidates.push(member.path.clone());
                report.candidate_bytes += member.size;
                if self.config.run {
                    report
                        .deletions
                        .record(&member.path, delete_file(&member.path, &self.config.delete));
                }
            } else {
                listing.put(format_args!("   {} {}\n", self.paint_plus(), member.path.display()));
            }
        }
        listing.put(format_args!("\n"));
    }

    fn paint_minus(&self) -> String {
        if self.config.color {
            "[-]".red().to_string()
        } else {
            "[-]".to_string()
        }
    }

    fn paint_plus(&self) -> String {
        if self.config.color {
            "[+]".green().to_string()
        } else {
            "[+]".to_string()
        }
    }
}
