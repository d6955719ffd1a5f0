//! Intent gate: is this utterance a question for the database?
//!
//! Keyword rules catch the obvious cases without a network round trip.
//! Anything else is put to the chat model; when the model is unreachable or
//! its reply cannot be parsed the utterance is treated as a database query,
//! since answering a stray question is cheaper than refusing a real one.

use serde::Deserialize;

use crate::query::client::ChatModel;
use crate::query::prompt::INTENT_SYSTEM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    QueryDatabase,
    Unknown,
}

/// Substrings that mark a data request.
const DATA_PHRASES: &[&str] = &[
    "query database",
    "database query",
    "query the database",
    "show database",
    "database info",
    "sql",
    "query",
    "how many",
    "count",
    "total",
    "list",
    "show me",
    "what",
    "who",
    "when",
    "where",
    "sales",
    "products",
    "customers",
    "orders",
    "employees",
    "attendance",
    "leave",
    "database",
    "data",
    "table",
    "records",
    "rows",
    "information",
    "details",
];

/// Substrings that make an utterance sound like a question or request.
const QUESTION_PHRASES: &[&str] = &["?", "how", "which", "tell me", "show", "get", "find"];

const INTENT_MAX_TOKENS: u32 = 60;

#[derive(Deserialize)]
struct IntentReply {
    intent: String,
}

/// Rule-only classification; `None` when the rules are not sure.
pub fn rule_intent(text: &str) -> Option<Intent> {
    let lower = text.to_lowercase();
    DATA_PHRASES
        .iter()
        .chain(QUESTION_PHRASES)
        .any(|phrase| lower.contains(phrase))
        .then_some(Intent::QueryDatabase)
}

/// Parse the model's JSON reply, tolerating chatter around the object.
fn parse_reply(reply: &str) -> Option<Intent> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let parsed: IntentReply = serde_json::from_str(&reply[start..=end]).ok()?;
    Some(match parsed.intent.trim() {
        "unknown" => Intent::Unknown,
        _ => Intent::QueryDatabase,
    })
}

pub async fn classify_intent(chat: &dyn ChatModel, text: &str) -> Intent {
    if let Some(intent) = rule_intent(text) {
        return intent;
    }

    match chat.complete(INTENT_SYSTEM, text, INTENT_MAX_TOKENS).await {
        Ok(reply) => parse_reply(&reply).unwrap_or_else(|| {
            log::warn!("query: unparseable intent reply {reply:?}, assuming database query");
            Intent::QueryDatabase
        }),
        Err(e) => {
            log::warn!("query: intent check failed ({e}), assuming database query");
            Intent::QueryDatabase
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::client::{LlmError, ScriptedChat};

    #[test]
    fn rules_catch_data_questions() {
        assert_eq!(
            rule_intent("How many employees are present today?"),
            Some(Intent::QueryDatabase)
        );
        assert_eq!(rule_intent("Tell me Ayesha's leaves"), Some(Intent::QueryDatabase));
        assert_eq!(rule_intent("good morning"), None);
    }

    #[tokio::test]
    async fn rules_short_circuit_the_model() {
        let chat = ScriptedChat::default();
        assert_eq!(
            classify_intent(&chat, "list all sales").await,
            Intent::QueryDatabase
        );
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn model_can_reject_small_talk() {
        let chat = ScriptedChat::new([r#"Sure: {"intent": "unknown"}"#]);
        assert_eq!(classify_intent(&chat, "good morning").await, Intent::Unknown);
        assert_eq!(chat.prompts()[0].1, "good morning");
    }

    #[tokio::test]
    async fn failures_default_to_database_query() {
        let chat = ScriptedChat::new(["not json"]);
        assert_eq!(classify_intent(&chat, "good morning").await, Intent::QueryDatabase);

        let chat = ScriptedChat::default();
        chat.push_err(LlmError::Timeout);
        assert_eq!(classify_intent(&chat, "good morning").await, Intent::QueryDatabase);
    }
}
