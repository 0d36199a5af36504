// SQLite source adapter

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};

use cohort_recon::error::{CohortError, Result};
use cohort_recon::model::{Customer, ExtractionPath, Item, Order, Quantity, Sale, SourceTables};

/// Read-only handle on the source store.
///
/// The handle is released exactly once: either by an explicit [`close`]
/// or when the value is dropped, whichever comes first.
///
/// [`close`]: SourceConnection::close
pub struct SourceConnection {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SourceConnection {
    /// Open the store at `path`. A missing or non-SQLite file is a
    /// connection error; the file is never created.
    pub fn open(path: &Path) -> Result<Self> {
        let connection_err = |e: rusqlite::Error| CohortError::Connection {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(connection_err)?;

        // SQLite opens lazily; touch the schema so a bad file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(connection_err)?;

        log::info!("connected to source {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// The live connection, or a connection error once closed.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| CohortError::Connection {
            path: self.path.clone(),
            message: "connection is closed".into(),
        })
    }

    /// Release the connection. Calling this again is a no-op.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match conn.close() {
            Ok(()) => log::info!("source connection closed"),
            // The handle comes back on failure; dropping it finalizes the close.
            Err((_, e)) => log::warn!("source connection closed with error: {e}"),
        }
    }
}

impl Drop for SourceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Whole-table load
// ---------------------------------------------------------------------------

fn load<T>(
    conn: &Connection,
    sql: &str,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    rows.collect()
}

/// Read a nullable numeric column, keeping SQLite's storage class.
fn quantity_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Quantity>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(n) => Ok(Some(Quantity::Int(n))),
        ValueRef::Real(r) => Ok(Some(Quantity::Real(r))),
        value => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "quantity".into(),
            value.data_type(),
        )),
    }
}

/// Load all four source tables in full. Key columns are read as nullable:
/// a table without a rowid key may hold NULL ids, which simply never join.
pub fn load_tables(source: &SourceConnection) -> Result<SourceTables> {
    let conn = source.connection()?;
    let load_err = |table: &str, e: rusqlite::Error| {
        CohortError::extraction(ExtractionPath::Algebra, format!("loading {table}: {e}"))
    };

    let customers = load(conn, "SELECT customer_id, age FROM Customer", |row| {
        Ok(Customer {
            customer_id: row.get(0)?,
            age: row.get(1)?,
        })
    })
    .map_err(|e| load_err("Customer", e))?;

    let sales = load(conn, "SELECT sales_id, customer_id FROM Sales", |row| {
        Ok(Sale {
            sales_id: row.get(0)?,
            customer_id: row.get(1)?,
        })
    })
    .map_err(|e| load_err("Sales", e))?;

    let orders = load(conn, "SELECT sales_id, item_id, quantity FROM Orders", |row| {
        Ok(Order {
            sales_id: row.get(0)?,
            item_id: row.get(1)?,
            quantity: quantity_at(row, 2)?,
        })
    })
    .map_err(|e| load_err("Orders", e))?;

    let items = load(conn, "SELECT item_id, item_name FROM Items", |row| {
        Ok(Item {
            item_id: row.get(0)?,
            item_name: row.get(1)?,
        })
    })
    .map_err(|e| load_err("Items", e))?;

    log::debug!(
        "loaded {} customers, {} sales, {} orders, {} items",
        customers.len(),
        sales.len(),
        orders.len(),
        items.len()
    );

    Ok(SourceTables { customers, sales, orders, items })
}
