//! Per-run execution context.
//!
//! One [`RunContext`] is created per invocation and owns the state every
//! phase shares. Components receive what they need through the builders
//! below rather than reaching for globals.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::actions::{AuditLog, DeleteConfig, WorkflowConfig};
use crate::cache::{default_hash_threads, CacheConfig, RunNames};
use crate::config::Config;
use crate::duplicates::{GroupingConfig, Strategy};
use crate::progress::{NoProgress, Progress, ProgressCallback};
use crate::signal::Interrupt;

/// Shared state of one run.
pub struct RunContext {
    /// Effective configuration, CLI flags applied
    pub config: Config,
    /// Cooperative cancellation
    pub interrupt: Interrupt,
    /// Progress sink for all phases
    pub progress: Arc<dyn ProgressCallback>,
    /// Start time, used in log file names
    pub started: DateTime<Local>,
}

impl RunContext {
    /// Create a context; progress bars are drawn unless `config.quiet`.
    #[must_use]
    pub fn new(config: Config, interrupt: Interrupt) -> Self {
        let progress: Arc<dyn ProgressCallback> = if config.quiet {
            Arc::new(NoProgress)
        } else {
            Arc::new(Progress::new(false))
        };
        Self {
            config,
            interrupt,
            progress,
            started: Local::now(),
        }
    }

    /// Replace the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Hash cache settings.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_enabled(self.config.cache)
            .with_hash_threads(self.config.hash_threads.unwrap_or_else(default_hash_threads))
            .with_shutdown_flag(self.interrupt.flag())
            .with_progress(Arc::clone(&self.progress))
    }

    /// Grouping settings for `strategy`.
    #[must_use]
    pub fn grouping_config(&self, strategy: Strategy) -> GroupingConfig {
        GroupingConfig::default()
            .with_threshold(self.config.threshold())
            .with_strategy(strategy)
            .with_shutdown_flag(self.interrupt.flag())
            .with_progress(Arc::clone(&self.progress))
    }

    /// Preserve workflow settings.
    #[must_use]
    pub fn workflow_config(&self, color: bool) -> WorkflowConfig {
        WorkflowConfig {
            sort: self.config.sort,
            reverse: self.config.reverse,
            run: self.config.run,
            delete: if self.config.trash {
                DeleteConfig::trash()
            } else {
                DeleteConfig::permanent()
            },
            print_warning: self.config.print_warning,
            color,
            shutdown_flag: Some(self.interrupt.flag()),
        }
    }

    /// File names for this run over `target_dir`.
    #[must_use]
    pub fn run_names(&self, target_dir: &Path, approximate: bool) -> RunNames {
        RunNames::new(target_dir, self.config.hash_method.as_str(), approximate)
    }

    /// Audit log writer for this run.
    #[must_use]
    pub fn audit_log(&self, target_dir: &Path, approximate: bool) -> AuditLog {
        AuditLog::new(
            self.config.resolved_log_dir(),
            self.run_names(target_dir, approximate),
            self.config.threshold(),
            self.started,
        )
    }
}
