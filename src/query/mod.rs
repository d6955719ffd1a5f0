//! Natural-language questions answered from a SQLite database.
//!
//! ```text
//! QueryPipeline::answer(question)
//!     SqlAssistant
//!       ├─ intent      keyword rules, then ChatModel JSON check
//!       ├─ schema      tables, columns, attendance sheet detection
//!       ├─ prompt      generation / repair / summary prompts
//!       ├─ sql         cleanup, read-only check, error parsing, repair
//!       ├─ database    read-only rusqlite connection
//!       └─ summary     one spoken sentence or two
//!     OfflinePipeline  (no database configured or reachable)
//! ```

pub mod assistant;
pub mod client;
pub mod database;
pub mod intent;
pub mod prompt;
pub mod schema;
pub mod sql;
pub mod summary;

pub use assistant::{
    OfflinePipeline, QueryError, QueryPipeline, SqlAssistant, NOT_A_DATABASE_QUESTION,
    OFFLINE_REPLY,
};
pub use client::{ApiChatModel, ChatModel, LlmError};
pub use database::{Database, DbError, QueryRows};
pub use intent::{classify_intent, Intent};
pub use schema::{AttendanceTable, SchemaSnapshot, TableInfo};
pub use sql::clean_generated_sql;
pub use summary::NO_RESULTS;

#[cfg(test)]
pub use assistant::MockPipeline;
#[cfg(test)]
pub use client::ScriptedChat;
