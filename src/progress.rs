//! Progress reporting utilities using indicatif.
//!
//! [`ProgressCallback`] is the sink the pipeline reports into; [`Progress`]
//! draws terminal bars, and [`NoProgress`] discards everything (tests, quiet
//! runs, library callers).

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Name of the hashing phase.
pub const PHASE_HASHING: &str = "hashing";
/// Name of the neighbor-index build phase.
pub const PHASE_INDEXING: &str = "indexing";
/// Name of the grouping phase.
pub const PHASE_GROUPING: &str = "grouping";
/// Name of the cache loading phase.
pub const PHASE_LOADING: &str = "loading";

/// Progress callback for the dedupe pipeline phases.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "hashing", "grouping")
    /// * `total` - Total number of items to process (0 for a spinner)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called after each item completes.
    ///
    /// `current` is the number of items done so far; items may complete out of
    /// order when the phase runs on a worker pool.
    fn on_progress(&self, current: usize, path: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Terminal progress reporter.
///
/// Only one phase is active at a time, so a single bar slot is enough.
pub struct Progress {
    active: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgdupes::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            active: Mutex::new(None),
            quiet,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ ")
    }

    fn phase_message(phase: &str) -> String {
        match phase {
            PHASE_HASHING => "Calculating image hashes".to_string(),
            PHASE_INDEXING => "Building neighbor index".to_string(),
            PHASE_GROUPING => "Searching similar images".to_string(),
            PHASE_LOADING => "Loading hash cache".to_string(),
            other => other.to_string(),
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = if total == 0 {
            let pb = ProgressBar::new_spinner();
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(Self::bar_style());
            pb
        };
        pb.set_message(Self::phase_message(phase));

        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, current: usize, _path: &str) {
        if self.quiet {
            return;
        }
        if let Ok(active) = self.active.lock() {
            if let Some(ref pb) = *active {
                pb.set_position(current as u64);
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Ok(mut active) = self.active.lock() {
            if let Some(pb) = active.take() {
                pb.finish_and_clear();
            }
        }
        log::debug!("Phase complete: {}", phase);
    }
}
