//! Schema discovery for prompt building and query repair.
//!
//! Besides plain table/column lists, discovery looks for an attendance
//! sheet: a table whose first row holds values such as `Present` or `Leave`.
//! Such tables are usually one column per day, which general-purpose SQL
//! generation handles badly, so they get a dedicated prompt.

use serde_json::Value;

use crate::query::database::{Database, DbError, QueryRows};

/// Cell values that mark an attendance sheet (compared lowercase).
pub const ATTENDANCE_VALUES: [&str; 6] = ["present", "leave", "late", "wfh", "half leave", "absent"];

const NAME_HINTS: [&str; 4] = ["name", "employee", "staff", "person"];

/// Table-name fragments that make a table worth describing first.
const RELATED_HINTS: [&str; 6] = ["attendance", "employee", "staff", "leave", "present", "late"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
    /// People/attendance related; all columns are shown for these.
    pub related: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceTable {
    pub table: String,
    pub columns: Vec<String>,
    pub name_column: Option<String>,
    /// Columns whose sample value is an attendance mark.
    pub date_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    /// Every user table in the database.
    pub all_tables: Vec<String>,
    /// The described subset, related tables first.
    pub tables: Vec<TableInfo>,
    pub attendance: Option<AttendanceTable>,
}

fn is_related(table: &str) -> bool {
    let lower = table.to_lowercase();
    RELATED_HINTS.iter().any(|hint| lower.contains(hint))
}

fn is_attendance_value(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| ATTENDANCE_VALUES.contains(&s.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Classify `table` from its first row.  `None` unless at least one cell
/// holds an attendance mark.
pub fn detect_attendance(table: &str, sample: &QueryRows) -> Option<AttendanceTable> {
    let record = sample.record(0);
    let date_columns: Vec<String> = record
        .iter()
        .filter(|(_, value)| is_attendance_value(value))
        .map(|(column, _)| column.to_string())
        .collect();
    if date_columns.is_empty() {
        return None;
    }

    let name_column = sample
        .columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            NAME_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .cloned();

    Some(AttendanceTable {
        table: table.to_string(),
        columns: sample.columns.clone(),
        name_column,
        date_columns,
    })
}

impl SchemaSnapshot {
    /// Inspect `db`, describing at most `table_limit` tables.
    pub fn discover(db: &Database, table_limit: usize) -> Result<Self, DbError> {
        let all_tables = db.table_names()?;

        let attendance = all_tables.iter().find_map(|table| {
            // Unreadable tables are skipped rather than failing discovery.
            let sample = db.sample_row(table).ok().flatten()?;
            detect_attendance(table, &sample)
        });

        let (related, other): (Vec<&String>, Vec<&String>) =
            all_tables.iter().partition(|t| is_related(t));

        let mut tables = Vec::new();
        for name in related.into_iter().chain(other).take(table_limit) {
            tables.push(TableInfo {
                columns: db.table_columns(name)?,
                related: is_related(name),
                name: name.clone(),
            });
        }

        log::debug!(
            "query: schema has {} table(s), described {}, attendance: {}",
            all_tables.len(),
            tables.len(),
            attendance.as_ref().map(|a| a.table.as_str()).unwrap_or("none")
        );

        Ok(Self {
            all_tables,
            tables,
            attendance,
        })
    }

    /// Real table name for `name`: exact match ignoring case (comparing the
    /// unqualified part of `schema.table`), else the closest name.
    pub fn resolve_table(&self, name: &str) -> Option<&str> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        self.all_tables
            .iter()
            .find(|t| t.rsplit('.').next().unwrap_or(t.as_str()).eq_ignore_ascii_case(bare))
            .map(String::as_str)
            .or_else(|| crate::query::sql::closest_name(bare, &self.all_tables))
    }
}
