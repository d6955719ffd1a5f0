//! Turning a result set into one short spoken answer.

use serde_json::Value;

use crate::query::client::ChatModel;
use crate::query::database::QueryRows;
use crate::query::prompt::{summary_prompt, SUMMARY_SYSTEM};

pub const NO_RESULTS: &str = "The query returned no results.";

/// Rows included in the preview handed to the model.
const PREVIEW_ROWS: usize = 10;

const SUMMARY_MAX_TOKENS: u32 = 100;

fn spoken_value(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn preview_json(rows: &QueryRows, count: usize) -> String {
    let records: Vec<Value> = rows
        .rows
        .iter()
        .take(count)
        .map(|row| {
            let object = rows
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<serde_json::Map<_, _>>();
            Value::Object(object)
        })
        .collect();
    Value::Array(records).to_string()
}

/// Describe `rows`.  A single row is read out verbatim; larger results are
/// summarised by the model over the first rows of at most `max_rows`.
pub async fn summarize(chat: &dyn ChatModel, rows: &QueryRows, max_rows: usize) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }

    let total = rows.len();
    let mut answer = format!("Query returned {total} row(s). ");

    if total == 1 {
        let fields = rows
            .record(0)
            .into_iter()
            .map(|(column, value)| format!("{column}: {}", spoken_value(value)))
            .collect::<Vec<_>>()
            .join(", ");
        answer.push_str(&format!("Result: {fields}."));
        return answer;
    }

    let considered = total.min(max_rows.max(1));
    let shown = considered.min(PREVIEW_ROWS);
    let prompt = summary_prompt(&preview_json(rows, shown), shown, total);

    match chat.complete(SUMMARY_SYSTEM, &prompt, SUMMARY_MAX_TOKENS).await {
        Ok(summary) => {
            answer.push_str(&summary);
            if total > max_rows {
                answer.push_str(&format!(
                    " (Showing summary of first {max_rows} rows, {total} total rows found.)"
                ));
            }
        }
        Err(e) => {
            log::warn!("query: summary generation failed: {e}");
            answer.push_str(&format!(
                "Found {total} record(s) with {} columns each.",
                rows.columns.len()
            ));
        }
    }
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::client::{LlmError, ScriptedChat};

    fn rows(count: usize) -> QueryRows {
        QueryRows {
            columns: vec!["name".into(), "dept".into()],
            rows: (0..count)
                .map(|i| vec![Value::from(format!("p{i}")), Value::Null])
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_result_has_fixed_reply() {
        let chat = ScriptedChat::default();
        assert_eq!(summarize(&chat, &rows(0), 100).await, NO_RESULTS);
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn single_row_is_read_out() {
        let chat = ScriptedChat::default();
        assert_eq!(
            summarize(&chat, &rows(1), 100).await,
            "Query returned 1 row(s). Result: name: p0, dept: none."
        );
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn many_rows_use_the_model_with_a_preview() {
        let chat = ScriptedChat::new(["Twelve people, no departments."]);
        let answer = summarize(&chat, &rows(12), 100).await;
        assert_eq!(answer, "Query returned 12 row(s). Twelve people, no departments.");

        let (system, user) = &chat.prompts()[0];
        assert_eq!(system, SUMMARY_SYSTEM);
        assert!(user.contains("showing first 10 of 12 rows"));
        assert!(user.contains(r#""name":"p9""#));
        assert!(!user.contains("p10"));
    }

    #[tokio::test]
    async fn truncation_is_noted() {
        let chat = ScriptedChat::new(["Lots."]);
        let answer = summarize(&chat, &rows(5), 3).await;
        assert_eq!(
            answer,
            "Query returned 5 row(s). Lots. (Showing summary of first 3 rows, 5 total rows found.)"
        );
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_counts() {
        let chat = ScriptedChat::default();
        chat.push_err(LlmError::Timeout);
        assert_eq!(
            summarize(&chat, &rows(4), 100).await,
            "Query returned 4 row(s). Found 4 record(s) with 2 columns each."
        );
    }
}
