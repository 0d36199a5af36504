use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

/// A row of the `Customer` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    /// Null only when the table has no rowid key; such rows never join.
    pub customer_id: Option<i64>,
    /// Null ages never fall inside a band.
    pub age: Option<i64>,
}

/// A row of the `Sales` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Sale {
    pub sales_id: Option<i64>,
    pub customer_id: Option<i64>,
}

/// A stored quantity in the storage class SQLite returned for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Int(i64),
    Real(f64),
}

impl Quantity {
    pub fn is_positive(&self) -> bool {
        match *self {
            Self::Int(n) => n > 0,
            Self::Real(r) => r > 0.0,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}

/// A row of the `Orders` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub sales_id: Option<i64>,
    pub item_id: Option<i64>,
    pub quantity: Option<Quantity>,
}

/// A row of the `Items` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub item_id: Option<i64>,
    pub item_name: String,
}

/// Full snapshot of the four source tables.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub customers: Vec<Customer>,
    pub sales: Vec<Sale>,
    pub orders: Vec<Order>,
    pub items: Vec<Item>,
}

// ---------------------------------------------------------------------------
// Cohort
// ---------------------------------------------------------------------------

/// Inclusive age range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeBand {
    pub min: i64,
    pub max: i64,
}

impl AgeBand {
    /// The marketing cohort the report targets.
    pub const TARGET: AgeBand = AgeBand { min: 18, max: 35 };

    pub fn contains(&self, age: i64) -> bool {
        self.min <= age && age <= self.max
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Total quantity of one item bought by one customer inside the band.
/// `total_quantity` is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseSummary {
    pub customer_id: i64,
    pub age: i64,
    pub item_name: String,
    pub total_quantity: i64,
}

impl PurchaseSummary {
    /// Canonical ordering key.
    pub fn sort_key(&self) -> (i64, &str) {
        (self.customer_id, self.item_name.as_str())
    }
}

/// Sort summaries into canonical `(customer_id, item_name)` order.
/// Stable, so rows sharing a key keep their relative order.
pub fn sort_canonical(rows: &mut [PurchaseSummary]) {
    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

// ---------------------------------------------------------------------------
// Extraction paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPath {
    /// One declarative SQL statement executed by the source engine.
    Query,
    /// Whole-table load followed by the in-memory relational pipeline.
    Algebra,
}

impl ExtractionPath {
    /// Human label used in console banners.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Query => "SQL query",
            Self::Algebra => "relational algebra",
        }
    }
}

impl fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Algebra => write!(f, "algebra"),
        }
    }
}

/// Outcome of one extraction path under the soft-fail policy: either the
/// rows it produced (possibly none) or the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Extraction {
    Rows { rows: Vec<PurchaseSummary> },
    Failed { reason: String },
}

impl Extraction {
    /// Collapse a fallible extraction into a soft-fail outcome, logging the fault.
    pub fn soft(path: ExtractionPath, result: crate::Result<Vec<PurchaseSummary>>) -> Self {
        match result {
            Ok(rows) => {
                log::info!("{path} path: retrieved {} records", rows.len());
                Self::Rows { rows }
            }
            Err(e) => {
                log::error!("{e}");
                Self::Failed { reason: e.to_string() }
            }
        }
    }

    /// Rows produced; empty when the path failed.
    pub fn rows(&self) -> &[PurchaseSummary] {
        match self {
            Self::Rows { rows } => rows,
            Self::Failed { .. } => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
