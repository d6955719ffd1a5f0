//! The question → answer pipeline used by the turn coordinator.
//!
//! ```text
//! question
//!   └─▶ intent gate ──(not a data question)──▶ fixed reply
//!         └─▶ schema discovery (blocking pool)
//!               └─▶ SQL generation (attendance or general prompt)
//!                     └─▶ read-only check ─▶ execute
//!                           ├─ no such column ─▶ closest column ─▶ regenerate
//!                           ├─ no such table  ─▶ closest table
//!                           └─▶ summary
//! ```
//!
//! [`QueryPipeline::answer`] never fails: every [`QueryError`] is turned
//! into a spoken apology at this boundary.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::query::client::{ChatModel, LlmError};
use crate::query::database::{Database, DbError, QueryRows};
use crate::query::intent::{classify_intent, Intent};
use crate::query::prompt::{
    attendance_sql_prompt, column_repair_prompt, general_sql_prompt, ATTENDANCE_SYSTEM,
    REPAIR_SYSTEM, SQL_SYSTEM,
};
use crate::query::schema::SchemaSnapshot;
use crate::query::sql::{
    clean_generated_sql, closest_name, is_read_only, missing_column, missing_table,
    replace_identifier, table_in_query,
};
use crate::query::summary::summarize;

pub const NOT_A_DATABASE_QUESTION: &str =
    "I can only answer questions about the database. Please ask me something about the database.";

pub const OFFLINE_REPLY: &str =
    "Sorry, I couldn't connect to the database. Please check your connection settings.";

const SQL_MAX_TOKENS: u32 = 300;

/// Columns listed in the "doesn't exist" apology.
const APOLOGY_COLUMNS: usize = 15;

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("chat model failed: {0}")]
    Llm(#[from] LlmError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("generated statement is not a read-only query")]
    NotReadOnly,

    #[error("model returned no SQL")]
    EmptySql,

    #[error("database has no tables")]
    NoTables,

    #[error("no such column `{0}` and no table to repair it against")]
    UnresolvedColumn(String),

    #[error("column `{column}` does not exist in `{table}`")]
    UnknownColumn {
        column: String,
        table: String,
        available: Vec<String>,
    },

    #[error("no table matches `{0}`")]
    UnknownTable(String),
}

impl QueryError {
    /// The sentence spoken to the user instead of an answer.
    pub fn apology(&self) -> String {
        match self {
            QueryError::Llm(e) => {
                format!("Sorry, I encountered an error while querying the database: {e}")
            }
            QueryError::Db(e) => {
                format!("Sorry, I encountered an error: {e}. Please try rephrasing your question.")
            }
            QueryError::NotReadOnly => {
                "Sorry, I can only run queries that read from the database.".to_string()
            }
            QueryError::EmptySql => {
                "Sorry, I couldn't work out a query for that. Please try rephrasing your question."
                    .to_string()
            }
            QueryError::NoTables => "No tables found in the database.".to_string(),
            QueryError::UnresolvedColumn(_) => "Sorry, I encountered a column name error. \
                 Please try rephrasing your question more specifically."
                .to_string(),
            QueryError::UnknownColumn {
                column,
                table,
                available,
            } => {
                let mut listed = available
                    .iter()
                    .take(APOLOGY_COLUMNS)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if available.len() > APOLOGY_COLUMNS {
                    listed.push_str("...");
                }
                format!(
                    "Sorry, the column '{column}' doesn't exist in {table}. Available columns: {listed}."
                )
            }
            QueryError::UnknownTable(table) => format!(
                "Sorry, I couldn't find the table '{table}' in the database. \
                 Please try rephrasing your question."
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// QueryPipeline trait
// ---------------------------------------------------------------------------

/// Answers one spoken question with one spoken reply.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    async fn answer(&self, question: &str) -> String;
}

// Compile-time check that the trait stays object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn QueryPipeline>) {}
};

// ---------------------------------------------------------------------------
// SqlAssistant
// ---------------------------------------------------------------------------

pub struct SqlAssistant {
    chat: Arc<dyn ChatModel>,
    db: Database,
    config: DatabaseConfig,
}

impl SqlAssistant {
    pub fn new(chat: Arc<dyn ChatModel>, db: Database, config: DatabaseConfig) -> Self {
        Self { chat, db, config }
    }

    /// Run `f` against the database on tokio's blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Database) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DbError::Task(e.to_string()))?
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<String, QueryError> {
        let raw = self.chat.complete(system, prompt, SQL_MAX_TOKENS).await?;
        let sql = clean_generated_sql(&raw);
        if sql.is_empty() {
            return Err(QueryError::EmptySql);
        }
        log::debug!("query: generated `{sql}`");
        Ok(sql)
    }

    async fn execute(&self, sql: &str) -> Result<QueryRows, QueryError> {
        if !is_read_only(sql) {
            log::warn!("query: refusing to run `{sql}`");
            return Err(QueryError::NotReadOnly);
        }
        let sql = sql.to_string();
        Ok(self.blocking(move |db| db.query(&sql)).await?)
    }

    async fn execute_with_repair(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        sql: &str,
    ) -> Result<QueryRows, QueryError> {
        let err = match self.execute(sql).await {
            Ok(rows) => return Ok(rows),
            Err(QueryError::Db(err)) => err,
            Err(other) => return Err(other),
        };

        let message = err.to_string();
        if let Some(column) = missing_column(&message) {
            return self.repair_column(question, schema, sql, &column).await;
        }
        if let Some(table) = missing_table(&message) {
            return self.repair_table(schema, sql, &table).await;
        }
        Err(QueryError::Db(err))
    }

    /// Substitute the closest real column, else ask for a new query with the
    /// real column list.
    async fn repair_column(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        sql: &str,
        column: &str,
    ) -> Result<QueryRows, QueryError> {
        let table = table_in_query(sql)
            .and_then(|t| schema.resolve_table(&t).map(str::to_string))
            .ok_or_else(|| QueryError::UnresolvedColumn(column.to_string()))?;

        let lookup = table.clone();
        let columns = self.blocking(move |db| db.table_columns(&lookup)).await?;

        if let Some(real) = closest_name(column, &columns) {
            let fixed = replace_identifier(sql, column, real);
            log::info!("query: column `{column}` → `{real}`");
            match self.execute(&fixed).await {
                Ok(rows) => return Ok(rows),
                Err(e) => log::debug!("query: substituted query failed: {e}"),
            }
        }

        let prompt = column_repair_prompt(question, &table, column, &columns);
        let regenerated = self.generate(REPAIR_SYSTEM, &prompt).await?;
        match self.execute(&regenerated).await {
            Ok(rows) => Ok(rows),
            Err(QueryError::NotReadOnly) => Err(QueryError::NotReadOnly),
            Err(e) => {
                log::debug!("query: regenerated query failed: {e}");
                Err(QueryError::UnknownColumn {
                    column: column.to_string(),
                    table,
                    available: columns,
                })
            }
        }
    }

    async fn repair_table(
        &self,
        schema: &SchemaSnapshot,
        sql: &str,
        table: &str,
    ) -> Result<QueryRows, QueryError> {
        let real = schema
            .resolve_table(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()))?;
        log::info!("query: table `{table}` → `{real}`");

        let fixed = replace_identifier(sql, table, real);
        self.execute(&fixed).await.map_err(|e| match e {
            QueryError::Db(_) => QueryError::UnknownTable(table.to_string()),
            other => other,
        })
    }

    /// The pipeline with errors surfaced.
    pub async fn try_answer(&self, question: &str) -> Result<String, QueryError> {
        if classify_intent(self.chat.as_ref(), question).await == Intent::Unknown {
            return Ok(NOT_A_DATABASE_QUESTION.to_string());
        }

        let limit = self.config.schema_table_limit;
        let schema = self
            .blocking(move |db| SchemaSnapshot::discover(db, limit))
            .await?;
        if schema.all_tables.is_empty() {
            return Err(QueryError::NoTables);
        }

        let sql = match &schema.attendance {
            Some(sheet) => {
                self.generate(ATTENDANCE_SYSTEM, &attendance_sql_prompt(question, sheet))
                    .await?
            }
            None => {
                self.generate(SQL_SYSTEM, &general_sql_prompt(question, &schema))
                    .await?
            }
        };

        let rows = self.execute_with_repair(question, &schema, &sql).await?;
        Ok(summarize(self.chat.as_ref(), &rows, self.config.max_rows).await)
    }
}

#[async_trait]
impl QueryPipeline for SqlAssistant {
    async fn answer(&self, question: &str) -> String {
        match self.try_answer(question).await {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("query: {e}");
                e.apology()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OfflinePipeline
// ---------------------------------------------------------------------------

/// Stands in when no database could be opened.
pub struct OfflinePipeline;

#[async_trait]
impl QueryPipeline for OfflinePipeline {
    async fn answer(&self, _question: &str) -> String {
        OFFLINE_REPLY.to_string()
    }
}

// ---------------------------------------------------------------------------
// MockPipeline (test only)
// ---------------------------------------------------------------------------

/// Fixed reply after an optional delay; records every question.  A
/// panicking mock panics after recording.
#[cfg(test)]
pub struct MockPipeline {
    reply: String,
    delay: std::time::Duration,
    panics: bool,
    questions: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockPipeline {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            delay: std::time::Duration::ZERO,
            panics: false,
            questions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl QueryPipeline for MockPipeline {
    async fn answer(&self, question: &str) -> String {
        self.questions.lock().unwrap().push(question.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics {
            panic!("pipeline exploded");
        }
        self.reply.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
