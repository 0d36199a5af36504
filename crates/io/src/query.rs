// Declarative extraction: one SQL statement, planned by SQLite

use rusqlite::named_params;

use cohort_recon::error::{CohortError, Result};
use cohort_recon::model::{AgeBand, ExtractionPath, PurchaseSummary};

use crate::source::SourceConnection;

/// Join, filter, aggregate and sort in a single statement.
///
/// The HAVING clause tests the integer-cast sum so that a group whose
/// fractional total truncates to zero is dropped, keeping `total_quantity`
/// strictly positive.
pub const PURCHASE_SUMMARY_SQL: &str = "\
SELECT
    c.customer_id,
    c.age,
    i.item_name,
    CAST(SUM(o.quantity) AS INTEGER) AS total_quantity
FROM Customer c
INNER JOIN Sales s ON c.customer_id = s.customer_id
INNER JOIN Orders o ON s.sales_id = o.sales_id
INNER JOIN Items i ON o.item_id = i.item_id
WHERE c.age BETWEEN :min_age AND :max_age
  AND o.quantity IS NOT NULL
  AND o.quantity > 0
GROUP BY c.customer_id, c.age, i.item_name
HAVING CAST(SUM(o.quantity) AS INTEGER) > 0
ORDER BY c.customer_id, i.item_name";

/// Run [`PURCHASE_SUMMARY_SQL`] for `band`.
pub fn query_purchase_summaries(
    source: &SourceConnection,
    band: AgeBand,
) -> Result<Vec<PurchaseSummary>> {
    let conn = source.connection()?;
    let query_err = |e: rusqlite::Error| CohortError::extraction(ExtractionPath::Query, e.to_string());

    let mut stmt = conn.prepare(PURCHASE_SUMMARY_SQL).map_err(query_err)?;
    let rows = stmt
        .query_map(
            named_params! { ":min_age": band.min, ":max_age": band.max },
            |row| {
                Ok(PurchaseSummary {
                    customer_id: row.get(0)?,
                    age: row.get(1)?,
                    item_name: row.get(2)?,
                    total_quantity: row.get(3)?,
                })
            },
        )
        .map_err(query_err)?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::path::Path;
    use tempfile::tempdir;

    const SCHEMA: &str = "
        CREATE TABLE Customer (customer_id INTEGER PRIMARY KEY, age INTEGER);
        CREATE TABLE Sales (sales_id INTEGER PRIMARY KEY, customer_id INTEGER);
        CREATE TABLE Orders (order_id INTEGER PRIMARY KEY, sales_id INTEGER, item_id INTEGER, quantity NUMERIC);
        CREATE TABLE Items (item_id INTEGER PRIMARY KEY, item_name TEXT);";

    fn seeded(path: &Path, data: &str) -> SourceConnection {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(data).unwrap();
        drop(conn);
        SourceConnection::open(path).unwrap()
    }

    #[test]
    fn widget_scenario() {
        let dir = tempdir().unwrap();
        let source = seeded(
            &dir.path().join("s.db"),
            "INSERT INTO Customer VALUES (5, 22);
             INSERT INTO Sales VALUES (100, 5);
             INSERT INTO Orders (sales_id, item_id, quantity) VALUES (100, 9, 3), (100, 9, 2), (100, 9, -1);
             INSERT INTO Items VALUES (9, 'Widget');",
        );

        let rows = query_purchase_summaries(&source, AgeBand::TARGET).unwrap();
        assert_eq!(
            rows,
            vec![PurchaseSummary {
                customer_id: 5,
                age: 22,
                item_name: "Widget".into(),
                total_quantity: 5,
            }]
        );
    }

    #[test]
    fn out_of_band_customer_yields_nothing() {
        let dir = tempdir().unwrap();
        let source = seeded(
            &dir.path().join("s.db"),
            "INSERT INTO Customer VALUES (7, 40);
             INSERT INTO Sales VALUES (1, 7);
             INSERT INTO Orders (sales_id, item_id, quantity) VALUES (1, 1, 4);
             INSERT INTO Items VALUES (1, 'Gadget');",
        );
        assert!(query_purchase_summaries(&source, AgeBand::TARGET).unwrap().is_empty());
    }

    #[test]
    fn real_quantities_are_cast_after_summing() {
        let dir = tempdir().unwrap();
        let source = seeded(
            &dir.path().join("s.db"),
            "INSERT INTO Customer VALUES (1, 30);
             INSERT INTO Sales VALUES (1, 1);
             INSERT INTO Orders (sales_id, item_id, quantity)
                 VALUES (1, 1, 1.5), (1, 1, 1.75), (1, 2, 0.5), (1, 3, NULL);
             INSERT INTO Items VALUES (1, 'Flour'), (2, 'Salt'), (3, 'Yeast');",
        );

        let rows = query_purchase_summaries(&source, AgeBand::TARGET).unwrap();
        // Flour: 3.25 -> 3. Salt: 0.5 -> 0, dropped. Yeast: null only, absent.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_name, "Flour");
        assert_eq!(rows[0].total_quantity, 3);
    }

    #[test]
    fn missing_table_is_a_query_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE Customer (customer_id INTEGER, age INTEGER);")
            .unwrap();

        let source = SourceConnection::open(&path).unwrap();
        let err = query_purchase_summaries(&source, AgeBand::TARGET).unwrap_err();
        assert!(matches!(err, CohortError::Extraction { path: ExtractionPath::Query, .. }));
    }
}
