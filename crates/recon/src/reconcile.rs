//! Reconciliation oracle between the query and algebra extraction paths.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::{self, Extraction, PurchaseSummary};

/// Column order both paths are normalized to before comparison.
pub const COLUMNS: [&str; 4] = ["customer_id", "age", "item_name", "total_quantity"];

/// A result set in the uniform comparison shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTable {
    pub columns: [&'static str; 4],
    pub rows: Vec<PurchaseSummary>,
}

impl SummaryTable {
    /// Copy `rows` into the canonical column layout and row order.
    pub fn normalize(rows: &[PurchaseSummary]) -> Self {
        let mut rows = rows.to_vec();
        model::sort_canonical(&mut rows);
        Self { columns: COLUMNS, rows }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BothEmpty,
    QueryEmpty,
    AlgebraEmpty,
}

impl SkipReason {
    /// True when one path found rows and the other did not.
    pub fn is_one_sided(&self) -> bool {
        !matches!(self, Self::BothEmpty)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothEmpty => write!(f, "both paths returned no rows"),
            Self::QueryEmpty => write!(f, "query path returned no rows"),
            Self::AlgebraEmpty => write!(f, "algebra path returned no rows"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconOutcome {
    Matched,
    Differ,
    Skipped { reason: SkipReason },
}

/// One disagreement, keyed by `(customer_id, item_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowDifference {
    QueryOnly { row: PurchaseSummary },
    AlgebraOnly { row: PurchaseSummary },
    ValueMismatch { query: PurchaseSummary, algebra: PurchaseSummary },
}

impl fmt::Display for RowDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryOnly { row } => write!(
                f,
                "only in query: customer {} item '{}' (age {}, qty {})",
                row.customer_id, row.item_name, row.age, row.total_quantity
            ),
            Self::AlgebraOnly { row } => write!(
                f,
                "only in algebra: customer {} item '{}' (age {}, qty {})",
                row.customer_id, row.item_name, row.age, row.total_quantity
            ),
            Self::ValueMismatch { query, algebra } => write!(
                f,
                "customer {} item '{}': query (age {}, qty {}) vs algebra (age {}, qty {})",
                query.customer_id,
                query.item_name,
                query.age,
                query.total_quantity,
                algebra.age,
                algebra.total_quantity
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub outcome: ReconOutcome,
    pub query_rows: usize,
    pub algebra_rows: usize,
    pub differences: Vec<RowDifference>,
}

impl Reconciliation {
    pub fn is_match(&self) -> bool {
        self.outcome == ReconOutcome::Matched
    }

    pub fn is_mismatch(&self) -> bool {
        self.outcome == ReconOutcome::Differ
    }

    /// Final verdict line for console output.
    pub fn verdict(&self) -> String {
        match &self.outcome {
            ReconOutcome::Matched => "results match".into(),
            ReconOutcome::Differ => "results differ".into(),
            ReconOutcome::Skipped { reason } => format!("reconciliation skipped: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Compare both extraction outcomes. Comparison only happens when both hold
/// rows; otherwise the result is `Skipped`, never a mismatch.
pub fn reconcile(query: &Extraction, algebra: &Extraction) -> Reconciliation {
    let query_rows = query.rows();
    let algebra_rows = algebra.rows();

    let skip = match (query_rows.is_empty(), algebra_rows.is_empty()) {
        (true, true) => Some(SkipReason::BothEmpty),
        (true, false) => Some(SkipReason::QueryEmpty),
        (false, true) => Some(SkipReason::AlgebraEmpty),
        (false, false) => None,
    };

    if let Some(reason) = skip {
        return Reconciliation {
            outcome: ReconOutcome::Skipped { reason },
            query_rows: query_rows.len(),
            algebra_rows: algebra_rows.len(),
            differences: Vec::new(),
        };
    }

    let left = SummaryTable::normalize(query_rows);
    let right = SummaryTable::normalize(algebra_rows);

    let (outcome, differences) = if left == right {
        (ReconOutcome::Matched, Vec::new())
    } else {
        (ReconOutcome::Differ, diff_rows(&left.rows, &right.rows))
    };

    Reconciliation {
        outcome,
        query_rows: query_rows.len(),
        algebra_rows: algebra_rows.len(),
        differences,
    }
}

/// Itemize disagreements by `(customer_id, item_name)`. Rows sharing a key
/// are paired in order.
pub fn diff_rows(query: &[PurchaseSummary], algebra: &[PurchaseSummary]) -> Vec<RowDifference> {
    let mut by_key: BTreeMap<(i64, &str), (Vec<&PurchaseSummary>, Vec<&PurchaseSummary>)> =
        BTreeMap::new();
    for row in query {
        by_key.entry(row.sort_key()).or_default().0.push(row);
    }
    for row in algebra {
        by_key.entry(row.sort_key()).or_default().1.push(row);
    }

    let mut differences = Vec::new();
    for (left, right) in by_key.values() {
        for i in 0..left.len().max(right.len()) {
            match (left.get(i), right.get(i)) {
                (Some(q), Some(a)) if q != a => differences.push(RowDifference::ValueMismatch {
                    query: (*q).clone(),
                    algebra: (*a).clone(),
                }),
                (Some(q), None) => differences.push(RowDifference::QueryOnly { row: (*q).clone() }),
                (None, Some(a)) => {
                    differences.push(RowDifference::AlgebraOnly { row: (*a).clone() })
                }
                _ => {}
            }
        }
    }
    differences
}
