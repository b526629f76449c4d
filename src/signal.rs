//! Ctrl+C as a cooperative interrupt.
//!
//! The first Ctrl+C raises an [`Interrupt`]. Nothing is killed: each phase
//! checks the raised flag at its own safe points. Hashing stops dispatching
//! images and no cache file is written. Grouping stops between queries. An
//! open preserve question is dropped, because the prompt reads stdin on a
//! helper thread and keeps polling the flag while it waits.
//!
//! A second Ctrl+C ends the process at once with exit code 130, for the rare
//! phase that does not reach a check point quickly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::ExitCode;

/// A raised-once flag shared by every phase of a run.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag nobody has raised, not connected to Ctrl+C.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Whether the run should wind down.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Raise the flag by hand, as Ctrl+C would.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for components configured with `with_shutdown_flag`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.raised)
    }

    fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }
}

/// Failure to hook Ctrl+C.
#[derive(Debug, thiserror::Error)]
#[error("cannot hook Ctrl+C: {0}")]
pub struct SignalError(#[from] ctrlc::Error);

/// Number of Ctrl+C presses since the hook was installed or last re-armed.
static PRESSES: AtomicUsize = AtomicUsize::new(0);
static HOOKED: OnceLock<Interrupt> = OnceLock::new();

fn on_ctrl_c(interrupt: &Interrupt) {
    if PRESSES.fetch_add(1, Ordering::SeqCst) > 0 {
        eprintln!("\nInterrupted again, exiting now");
        std::process::exit(ExitCode::Interrupted.as_i32());
    }
    interrupt.raise();
    eprintln!("\nInterrupted, finishing the current step (Ctrl+C again to quit now)");
    log::info!("Interrupt requested");
}

/// Hook Ctrl+C to a fresh, lowered [`Interrupt`].
///
/// The hook is process-wide and installed once. Later calls re-arm it: the
/// same flag comes back lowered and the press count starts over. If some
/// other code already owns the Ctrl+C hook, a detached flag is returned and
/// interrupts are left to that code.
///
/// # Errors
///
/// Returns [`SignalError`] if the platform refuses the hook.
pub fn install_handler() -> Result<Interrupt, SignalError> {
    PRESSES.store(0, Ordering::SeqCst);
    if let Some(interrupt) = HOOKED.get() {
        interrupt.clear();
        return Ok(interrupt.clone());
    }

    let interrupt = Interrupt::detached();
    let hooked = interrupt.clone();
    match ctrlc::set_handler(move || on_ctrl_c(&hooked)) {
        Ok(()) => Ok(HOOKED.get_or_init(|| interrupt).clone()),
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C is already hooked elsewhere; interrupts will not be observed");
            Ok(interrupt)
        }
        Err(e) => Err(e.into()),
    }
}
