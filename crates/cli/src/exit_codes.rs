//! CLI Exit Code Registry
//!
//! Single source of truth for `cohort` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success: results match, or reconciliation skipped    |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage or config error                                |
//! | 3    | Source database could not be opened                  |
//! | 4    | Both paths produced rows and the rows differ         |

use cohort_recon::error::CohortError;
use cohort_recon::reconcile::Reconciliation;

/// Success - report ran; results match or there was nothing to compare.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable or invalid config.
pub const EXIT_USAGE: u8 = 2;

/// Source store missing, unreadable, or not a database.
pub const EXIT_CONNECTION: u8 = 3;

/// Reconciliation found differences between the two paths.
pub const EXIT_MISMATCH: u8 = 4;

/// Map a run-aborting error to its exit code.
pub fn error_exit_code(err: &CohortError) -> u8 {
    match err {
        CohortError::Config(_) => EXIT_USAGE,
        CohortError::Connection { .. } => EXIT_CONNECTION,
        // Recovered inside the run; only reachable if a caller propagates one.
        CohortError::Extraction { .. } | CohortError::Sink { .. } => EXIT_ERROR,
    }
}

/// Exit code for a run that completed: only a real mismatch is non-zero.
pub fn reconciliation_exit_code(recon: &Reconciliation) -> u8 {
    if recon.is_mismatch() {
        EXIT_MISMATCH
    } else {
        EXIT_SUCCESS
    }
}
