// Soft-fail entry points for both extraction paths

use cohort_recon::algebra::run_pipeline;
use cohort_recon::model::{AgeBand, Extraction, ExtractionPath};

use crate::query::query_purchase_summaries;
use crate::source::{load_tables, SourceConnection};

/// Declarative path. A fault is logged and reported as [`Extraction::Failed`].
pub fn extract_with_query(source: &SourceConnection, band: AgeBand) -> Extraction {
    Extraction::soft(ExtractionPath::Query, query_purchase_summaries(source, band))
}

/// In-memory path: full table load, then the relational pipeline.
/// A fault in either step is logged and reported as [`Extraction::Failed`].
pub fn extract_with_algebra(source: &SourceConnection, band: AgeBand) -> Extraction {
    let result = load_tables(source).and_then(|tables| run_pipeline(&tables, band));
    Extraction::soft(ExtractionPath::Algebra, result)
}
