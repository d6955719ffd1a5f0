//! Chat-completion client used for intent checks, SQL generation and
//! result summaries.
//!
//! `ApiChatModel` calls any OpenAI-compatible `/v1/chat/completions`
//! endpoint: Ollama in OpenAI mode, OpenAI, Azure-style gateways, LM Studio,
//! vLLM.  All connection details come from [`LlmConfig`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatModel trait
// ---------------------------------------------------------------------------

/// One system + user exchange returning the assistant's text, trimmed and
/// guaranteed non-empty.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiChatModel
// ---------------------------------------------------------------------------

pub struct ApiChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ApiChatModel {
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for ApiChatModel {
    /// `Authorization: Bearer …` is attached only for a non-empty key, so
    /// local providers work without one.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user",   "content": user   }
            ],
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  max_tokens
        });

        let mut req = self.client.post(&url).json(&body);
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// ScriptedChat (test only)
// ---------------------------------------------------------------------------

/// Replays queued replies in order and records every prompt.  Once the
/// script runs out every call fails with [`LlmError::EmptyResponse`].
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedChat {
    replies: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    prompts: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl ScriptedChat {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chat = Self::default();
        for reply in replies {
            chat.push_ok(reply);
        }
        chat
    }

    pub fn push_ok(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// `(system, user)` pairs in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, system: &str, user: &str, _max_tokens: u32) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_accepts_missing_and_empty_keys() {
        let _ = ApiChatModel::from_config(&LlmConfig::default());
        let _ = ApiChatModel::from_config(&LlmConfig {
            api_key: Some(String::new()),
            ..LlmConfig::default()
        });
    }

    #[test]
    fn chat_model_is_object_safe() {
        let model: Box<dyn ChatModel> = Box::new(ApiChatModel::from_config(&LlmConfig::default()));
        drop(model);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_error() {
        let model = ApiChatModel::from_config(&LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..LlmConfig::default()
        });
        let err = model.complete("system", "user", 16).await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_) | LlmError::Timeout));
    }

    #[tokio::test]
    async fn scripted_chat_replays_in_order_then_runs_dry() {
        let chat = ScriptedChat::new(["one", "two"]);
        assert_eq!(chat.complete("s", "a", 8).await.unwrap(), "one");
        assert_eq!(chat.complete("s", "b", 8).await.unwrap(), "two");
        assert!(matches!(
            chat.complete("s", "c", 8).await,
            Err(LlmError::EmptyResponse)
        ));
        assert_eq!(chat.calls(), 3);
        assert_eq!(chat.prompts()[1].1, "b");
    }
}
