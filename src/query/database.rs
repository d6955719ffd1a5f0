//! Read-only SQLite access.
//!
//! The connection sits behind a mutex and every call is synchronous; the
//! assistant runs them on tokio's blocking pool.  Connections are opened
//! read-only and additionally put into `query_only` mode, so a generated
//! statement can never modify data even if it slips past the SQL checks.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// QueryRows
// ---------------------------------------------------------------------------

/// A materialised result set.  Values are JSON so they can be printed and
/// handed to the model without further conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `index` as `column → value` pairs.
    pub fn record(&self, index: usize) -> Vec<(&str, &Value)> {
        self.rows
            .get(index)
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open an existing database file read-only.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        log::info!("query: opened {}", path.display());
        Self::from_connection(conn)
    }

    /// Wrap an existing connection (tests use in-memory databases).
    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        conn.pragma_update(None, "query_only", true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// User tables in name order.
    pub fn table_names(&self) -> Result<Vec<String>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Column names in declaration order; empty for an unknown table.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// First row of `table`, if any.
    pub fn sample_row(&self, table: &str) -> Result<Option<QueryRows>, DbError> {
        let rows = self.query(&format!("SELECT * FROM {} LIMIT 1", quote_ident(table)))?;
        Ok((!rows.is_empty()).then_some(rows))
    }

    /// Run one statement and collect every row.
    pub fn query(&self, sql: &str) -> Result<QueryRows, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(to_json))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }

        log::debug!("query: {} row(s) from `{sql}`", rows.len());
        Ok(QueryRows { columns, rows })
    }
}

/// Double-quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// `employees(id, name, department)` with three rows and an
    /// `attendance` sheet with one column per day.
    pub fn hr_database(with_attendance: bool) -> Database {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, department TEXT);
             INSERT INTO employees (name, department) VALUES
                ('Ayesha Khan', 'Sales'), ('Bilal Ahmed', 'Sales'), ('Sara Malik', 'IT');",
        )
        .unwrap();
        if with_attendance {
            conn.execute_batch(
                "CREATE TABLE attendance (employee_name TEXT, \"27\" TEXT, \"28\" TEXT);
                 INSERT INTO attendance VALUES
                    ('Ayesha Khan', 'Present', 'Late'),
                    ('Bilal Ahmed', 'Leave', 'Present');",
            )
            .unwrap();
        }
        Database::from_connection(conn).unwrap()
    }
}
