//! In-memory relational pipeline over a [`SourceTables`] snapshot.
//!
//! Each stage is a pure function that takes the previous stage's rows and
//! returns a new `Vec`:
//!
//! ```text
//! filter_age_band → join_sales → join_orders → join_items
//!     → filter_positive_quantity → group_sum → coerce_totals
//!     → drop_non_positive → sort_canonical
//! ```
//!
//! Nothing here touches the source engine's planner; the SQL path in
//! `cohort-io` computes the same result independently.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CohortError, Result};
use crate::model::{
    self, AgeBand, Customer, ExtractionPath, Item, Order, PurchaseSummary, Quantity, Sale,
    SourceTables,
};

// ---------------------------------------------------------------------------
// Stage rows
// ---------------------------------------------------------------------------

/// Customer ⋈ Sales.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSale {
    pub customer_id: i64,
    pub age: i64,
    pub sales_id: i64,
}

/// Customer ⋈ Sales ⋈ Orders.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerOrder {
    pub customer_id: i64,
    pub age: i64,
    pub item_id: i64,
    pub quantity: Option<Quantity>,
}

/// Customer ⋈ Sales ⋈ Orders ⋈ Items.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseLine {
    pub customer_id: i64,
    pub age: i64,
    pub item_name: String,
    pub quantity: Option<Quantity>,
}

/// Un-coerced per-group sum.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub customer_id: i64,
    pub age: i64,
    pub item_name: String,
    pub sum: QuantitySum,
}

// ---------------------------------------------------------------------------
// SUM() accumulator
// ---------------------------------------------------------------------------

/// Integers at or beyond 2^52 in magnitude are split before entering the
/// float sum so no low bits are lost in the conversion.
const SPLIT_THRESHOLD: i64 = 4_503_599_627_370_496;
const SPLIT_LOW: i64 = 16_384;

/// Running total with SQLite `SUM()` semantics.
///
/// Integers add exactly. The first real value, or the first integer overflow,
/// switches the total to a Kahan-Babuska-Neumaier compensated float seeded
/// with the integer sum so far. An overflow that is not followed by a real
/// value makes the whole sum an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantitySum {
    int_sum: i64,
    real_sum: f64,
    real_err: f64,
    approx: bool,
    overflowed: bool,
}

impl QuantitySum {
    pub fn add(&mut self, quantity: Quantity) {
        match (self.approx, quantity) {
            (false, Quantity::Int(n)) => match self.int_sum.checked_add(n) {
                Some(sum) => self.int_sum = sum,
                None => {
                    self.overflowed = true;
                    self.start_real();
                    self.step_int(n);
                }
            },
            (false, Quantity::Real(r)) => {
                self.start_real();
                self.step_real(r);
            }
            (true, Quantity::Int(n)) => self.step_int(n),
            (true, Quantity::Real(r)) => {
                self.overflowed = false;
                self.step_real(r);
            }
        }
    }

    /// The final sum, or `None` after an unrecovered integer overflow.
    pub fn finish(&self) -> Option<Quantity> {
        if !self.approx {
            return Some(Quantity::Int(self.int_sum));
        }
        if self.overflowed {
            return None;
        }
        if self.real_err.is_finite() {
            Some(Quantity::Real(self.real_sum + self.real_err))
        } else {
            Some(Quantity::Real(self.real_sum))
        }
    }

    fn start_real(&mut self) {
        let n = self.int_sum;
        if n <= -SPLIT_THRESHOLD || n >= SPLIT_THRESHOLD {
            let low = n % SPLIT_LOW;
            self.real_sum = (n - low) as f64;
            self.real_err = low as f64;
        } else {
            self.real_sum = n as f64;
            self.real_err = 0.0;
        }
        self.approx = true;
    }

    fn step_int(&mut self, n: i64) {
        if n <= -SPLIT_THRESHOLD || n >= SPLIT_THRESHOLD {
            let low = n % SPLIT_LOW;
            self.step_real((n - low) as f64);
            self.step_real(low as f64);
        } else {
            self.step_real(n as f64);
        }
    }

    fn step_real(&mut self, r: f64) {
        let s = self.real_sum;
        let t = s + r;
        if s.abs() > r.abs() {
            self.real_err += (s - t) + r;
        } else {
            self.real_err += (r - t) + s;
        }
        self.real_sum = t;
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Customers whose age lies in `band`. Null ages are dropped.
pub fn filter_age_band(customers: &[Customer], band: AgeBand) -> Vec<Customer> {
    customers
        .iter()
        .filter(|c| c.age.is_some_and(|age| band.contains(age)))
        .cloned()
        .collect()
}

/// Index `rows` by an optional key; rows with a null key never join.
fn index_by<T>(rows: &[T], key: impl Fn(&T) -> Option<i64>) -> HashMap<i64, Vec<&T>> {
    let mut index: HashMap<i64, Vec<&T>> = HashMap::new();
    for row in rows {
        if let Some(k) = key(row) {
            index.entry(k).or_default().push(row);
        }
    }
    index
}

/// Inner join on `customer_id`.
pub fn join_sales(customers: &[Customer], sales: &[Sale]) -> Vec<CustomerSale> {
    let by_customer = index_by(sales, |s| s.customer_id);
    customers
        .iter()
        .filter_map(|c| {
            let customer_id = c.customer_id?;
            Some((customer_id, c.age?, by_customer.get(&customer_id)?))
        })
        .flat_map(|(customer_id, age, matches)| {
            matches.iter().filter_map(move |s| {
                Some(CustomerSale {
                    customer_id,
                    age,
                    sales_id: s.sales_id?,
                })
            })
        })
        .collect()
}

/// Inner join on `sales_id`. Orders with a null `item_id` cannot reach Items
/// and are dropped here.
pub fn join_orders(rows: &[CustomerSale], orders: &[Order]) -> Vec<CustomerOrder> {
    let by_sale = index_by(orders, |o| o.sales_id);
    rows.iter()
        .filter_map(|cs| Some((cs, by_sale.get(&cs.sales_id)?)))
        .flat_map(|(cs, matches)| {
            matches.iter().filter_map(move |o| {
                Some(CustomerOrder {
                    customer_id: cs.customer_id,
                    age: cs.age,
                    item_id: o.item_id?,
                    quantity: o.quantity,
                })
            })
        })
        .collect()
}

/// Inner join on `item_id`.
pub fn join_items(rows: &[CustomerOrder], items: &[Item]) -> Vec<PurchaseLine> {
    let by_item = index_by(items, |i| i.item_id);
    rows.iter()
        .filter_map(|co| Some((co, by_item.get(&co.item_id)?)))
        .flat_map(|(co, matches)| {
            matches.iter().map(move |i| PurchaseLine {
                customer_id: co.customer_id,
                age: co.age,
                item_name: i.item_name.clone(),
                quantity: co.quantity,
            })
        })
        .collect()
}

/// Keep lines with a present, strictly positive quantity.
pub fn filter_positive_quantity(lines: &[PurchaseLine]) -> Vec<PurchaseLine> {
    lines
        .iter()
        .filter(|l| l.quantity.is_some_and(|q| q.is_positive()))
        .cloned()
        .collect()
}

/// Group by `(customer_id, age, item_name)` and sum quantities in line order.
/// Null quantities are skipped, as `SUM()` skips them.
pub fn group_sum(lines: &[PurchaseLine]) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<(i64, i64, &str), QuantitySum> = BTreeMap::new();

    for line in lines {
        let key = (line.customer_id, line.age, line.item_name.as_str());
        let sum = groups.entry(key).or_default();
        if let Some(quantity) = line.quantity {
            sum.add(quantity);
        }
    }

    groups
        .into_iter()
        .map(|((customer_id, age, item_name), sum)| GroupTotal {
            customer_id,
            age,
            item_name: item_name.to_string(),
            sum,
        })
        .collect()
}

/// Truncate a real sum toward zero the way `CAST(.. AS INTEGER)` does,
/// saturating at the `i64` bounds. NaN has no integer value and yields `None`.
pub fn coerce_quantity(total: f64) -> Option<i64> {
    // Largest doubles below 2^63 in magnitude that SQLite still truncates
    const UPPER: f64 = 9_223_372_036_854_774_784.0;
    const LOWER: f64 = -9_223_372_036_854_774_784.0;
    if total.is_nan() {
        None
    } else if total < LOWER {
        Some(i64::MIN)
    } else if total > UPPER {
        Some(i64::MAX)
    } else {
        Some(total.trunc() as i64)
    }
}

/// Coerce every group total to an integer. A group whose integer sum
/// overflowed fails the whole path; a NaN total drops its group.
pub fn coerce_totals(groups: &[GroupTotal]) -> Result<Vec<PurchaseSummary>> {
    let mut rows = Vec::with_capacity(groups.len());
    for g in groups {
        let total = g.sum.finish().ok_or_else(|| {
            CohortError::extraction(
                ExtractionPath::Algebra,
                format!("customer {} item '{}': integer overflow", g.customer_id, g.item_name),
            )
        })?;
        let total_quantity = match total {
            Quantity::Int(n) => n,
            Quantity::Real(r) => match coerce_quantity(r) {
                Some(n) => n,
                None => {
                    log::debug!("customer {} item '{}': sum is NaN", g.customer_id, g.item_name);
                    continue;
                }
            },
        };
        rows.push(PurchaseSummary {
            customer_id: g.customer_id,
            age: g.age,
            item_name: g.item_name.clone(),
            total_quantity,
        });
    }
    Ok(rows)
}

/// Drop summaries whose total is not strictly positive.
pub fn drop_non_positive(rows: &[PurchaseSummary]) -> Vec<PurchaseSummary> {
    rows.iter().filter(|r| r.total_quantity > 0).cloned().collect()
}

/// Return a copy in canonical `(customer_id, item_name)` order.
pub fn sort_canonical(rows: &[PurchaseSummary]) -> Vec<PurchaseSummary> {
    let mut sorted = rows.to_vec();
    model::sort_canonical(&mut sorted);
    sorted
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Compute purchase summaries for `band` from a loaded snapshot.
pub fn run_pipeline(tables: &SourceTables, band: AgeBand) -> Result<Vec<PurchaseSummary>> {
    let customers = filter_age_band(&tables.customers, band);
    let with_sales = join_sales(&customers, &tables.sales);
    let with_orders = join_orders(&with_sales, &tables.orders);
    let lines = join_items(&with_orders, &tables.items);
    let positive = filter_positive_quantity(&lines);
    log::debug!(
        "pipeline: {} customers in band {band}, {} sales, {} orders, {} lines, {} positive",
        customers.len(),
        with_sales.len(),
        with_orders.len(),
        lines.len(),
        positive.len()
    );

    let groups = group_sum(&positive);
    let coerced = coerce_totals(&groups)?;
    let kept = drop_non_positive(&coerced);
    if kept.len() != coerced.len() {
        log::debug!("pipeline: dropped {} non-positive groups", coerced.len() - kept.len());
    }

    Ok(sort_canonical(&kept))
}
