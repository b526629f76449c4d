//! Structured error handling and exit codes.

use serde::Serialize;

use crate::cache::CacheError;
use crate::duplicates::GroupingError;

/// Exit codes for imgdupes.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Backend unavailable (the requested neighbor search backend does not exist)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: duplicates were found (or the workflow completed).
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: the run completed but found no duplicate sets.
    NoDuplicates = 2,
    /// The configured backend cannot be loaded.
    BackendUnavailable = 3,
    /// Interrupted: the run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "ID000",
            Self::GeneralError => "ID001",
            Self::NoDuplicates => "ID002",
            Self::BackendUnavailable => "ID003",
            Self::Interrupted => "ID130",
        }
    }

    /// Exit code for an error that ended the run.
    ///
    /// The whole cause chain is inspected, so context added with `anyhow`
    /// does not hide the original error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<GroupingError>() {
                match e {
                    GroupingError::BackendUnavailable { .. } => return Self::BackendUnavailable,
                    GroupingError::Interrupted => return Self::Interrupted,
                    _ => {}
                }
            }
            if matches!(cause.downcast_ref::<CacheError>(), Some(CacheError::Interrupted)) {
                return Self::Interrupted;
            }
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "ID001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
