//! Prompts for intent checks, SQL generation, column repair and result
//! summaries.
//!
//! Every builder returns the user message; the matching system message is
//! one of the `*_SYSTEM` constants.  Generated SQL targets SQLite.

use crate::query::schema::{AttendanceTable, SchemaSnapshot};

// ---------------------------------------------------------------------------
// System instructions
// ---------------------------------------------------------------------------

pub const INTENT_SYSTEM: &str = "\
You are an intent parser for a database assistant.
Decide whether the user utterance asks for information that could be stored in a \
business database (people, attendance, sales, products, customers, orders or any \
other records). Respond with JSON only: {\"intent\": \"query_database\"} or \
{\"intent\": \"unknown\"}.";

pub const SQL_SYSTEM: &str = "\
You are a SQLite query generator. Return only one valid SELECT statement.";

pub const ATTENDANCE_SYSTEM: &str = "\
You are a SQLite query generator for attendance and leave tracking. \
Return only one valid SELECT statement using the exact table and column names given.";

pub const REPAIR_SYSTEM: &str = "\
You are a SQLite query generator. Return only one valid SELECT statement using \
the exact column names provided.";

pub const SUMMARY_SYSTEM: &str = "\
You are a concise database query summarizer. Always respond in 1-2 short sentences.";

/// Columns listed per unrelated table before the list is cut short.
const COLUMN_PREVIEW: usize = 20;

const OUTPUT_RULES: &str = "\
- Use ONLY the exact table and column names listed above; never invent or abbreviate them.
- Quote identifiers that are numbers or contain spaces with double quotes, e.g. \"27\".
- Match names with LIKE '%Name%' unless an exact match is clearly intended.
- Only SELECT queries; no INSERT, UPDATE, DELETE or DDL.
- Return ONLY the SQL query: no explanations, no markdown, no code fences.";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// General generation prompt over the described tables.
pub fn general_sql_prompt(question: &str, schema: &SchemaSnapshot) -> String {
    let table_list = schema
        .tables
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut schema_lines = String::new();
    for table in &schema.tables {
        let shown = if table.related {
            table.columns.len()
        } else {
            table.columns.len().min(COLUMN_PREVIEW)
        };
        schema_lines.push_str(&format!(
            "{}: {}",
            table.name,
            table.columns[..shown].join(", ")
        ));
        if shown < table.columns.len() {
            schema_lines.push_str(&format!(" (and {} more columns)", table.columns.len() - shown));
        }
        schema_lines.push('\n');
    }

    format!(
        "Understand the user's request and write an accurate SQLite query.

AVAILABLE TABLES: {table_list}

TABLE SCHEMAS (actual column names):
{schema_lines}
USER REQUEST: \"{question}\"

Attendance wording:
- \"leaves\" means the value 'Leave', \"late\" means 'Late', \"present\" means 'Present'.
- \"on 27\" usually refers to a column named after that day.

Rules:
- Use COUNT(*) or COUNT(column) with a WHERE clause for counting questions.
{OUTPUT_RULES}

SQL Query:"
    )
}

/// Specialised prompt for a one-column-per-day attendance sheet.
pub fn attendance_sql_prompt(question: &str, sheet: &AttendanceTable) -> String {
    let table = &sheet.table;
    let columns = sheet.columns.join(", ");
    let name_column = sheet
        .name_column
        .as_deref()
        .unwrap_or("the first column that looks like a name");
    let date_columns = sheet
        .date_columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are generating SQLite queries for an ATTENDANCE/LEAVE tracking table.

TABLE: {table}
ALL COLUMNS: {columns}
NAME COLUMN (filter by employee name): {name_column}
DATE/ATTENDANCE COLUMNS (values: Present, Leave, Late, WFH, Half Leave, Absent, NULL): {date_columns}

USER REQUEST: \"{question}\"

Query mapping:
- \"How many leaves did <Name> get?\": sum one CASE per date column,
  SELECT SUM((CASE WHEN \"c1\" = 'Leave' THEN 1 ELSE 0 END) + (CASE WHEN \"c2\" = 'Leave' THEN 1 ELSE 0 END) + ...) AS leave_count
  FROM {table} WHERE {name_column} LIKE '%<Name>%'
- \"How many days was <Name> late?\": the same with 'Late'.
- \"Who was late on <day>?\": SELECT {name_column} FROM {table} WHERE \"<day>\" = 'Late'
- \"How many employees were present on <day>?\": SELECT COUNT(*) FROM {table} WHERE \"<day>\" = 'Present'

Rules:
- Counting across several date columns needs one CASE per column, summed.
{OUTPUT_RULES}

SQL Query:"
    )
}

/// Regeneration prompt after `bad` turned out not to exist in `table`.
pub fn column_repair_prompt(question: &str, table: &str, bad: &str, columns: &[String]) -> String {
    let shown = columns.len().min(COLUMN_PREVIEW);
    format!(
        "The previous query failed because column '{bad}' doesn't exist in {table}.

Actual columns in {table}: {}

User request: {question}

Generate a NEW SQLite query using ONLY the columns listed above and the table {table}. \
Return ONLY the SQL query.

SQL Query:",
        columns[..shown].join(", ")
    )
}

/// Summary request over a JSON preview of the first `shown` of `total` rows.
pub fn summary_prompt(preview: &str, shown: usize, total: usize) -> String {
    format!(
        "Summarize the following query results in a very short, concise way (1-2 sentences max).
Focus on key insights, patterns, or important numbers.

Query results (showing first {shown} of {total} rows):
{preview}

Provide a brief summary:"
    )
}
