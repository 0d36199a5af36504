//! `cohort-recon`: dual-path purchase extraction engine.
//!
//! Pure engine crate: receives pre-loaded source tables or pre-extracted
//! summaries, returns aggregated and reconciled results.
//! No CLI or IO dependencies.

pub mod algebra;
pub mod error;
pub mod model;
pub mod reconcile;

pub use algebra::run_pipeline;
pub use error::{CohortError, Result};
pub use model::{AgeBand, Extraction, ExtractionPath, PurchaseSummary, Quantity, SourceTables};
pub use reconcile::{reconcile, Reconciliation, ReconOutcome};
