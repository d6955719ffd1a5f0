//! `SpeechSynthesizer` trait and the HTTP implementation.
//!
//! `ApiSynthesizer` calls any OpenAI-compatible `/v1/audio/speech`
//! endpoint and writes the returned WAV bytes to disk.  All connection
//! details come from [`TtsConfig`].

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TtsConfig;

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("speech synthesis timed out")]
    Timeout,

    #[error("speech endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("speech endpoint returned no audio")]
    EmptyAudio,

    #[error("failed to write audio clip: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Renders text to a WAV file at `dest`.
///
/// `lang` is a BCP-47 style tag (`"en-US"`); implementations decide how
/// much of it they honour.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, lang: &str, dest: &Path) -> Result<(), TtsError>;
}

// ---------------------------------------------------------------------------
// ApiSynthesizer
// ---------------------------------------------------------------------------

pub struct ApiSynthesizer {
    client: reqwest::Client,
    config: TtsConfig,
}

impl ApiSynthesizer {
    pub fn from_config(config: &TtsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Voice for a language tag, keyed by its lowercase two-letter prefix.
    pub fn voice_for(&self, lang: &str) -> &str {
        let prefix: String = lang
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.config
            .voices
            .get(&prefix)
            .map(String::as_str)
            .unwrap_or(&self.config.default_voice)
    }
}

#[async_trait]
impl SpeechSynthesizer for ApiSynthesizer {
    async fn synthesize(&self, text: &str, lang: &str, dest: &Path) -> Result<(), TtsError> {
        let url = format!("{}/v1/audio/speech", self.config.base_url);

        let body = serde_json::json!({
            "model":           self.config.model,
            "input":           text,
            "voice":           self.voice_for(lang),
            "speed":           self.config.speed,
            "response_format": "wav"
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
            return Err(TtsError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        tokio::fs::write(dest, &audio).await?;

        log::debug!("tts: wrote {} bytes to {}", audio.len(), dest.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSynthesizer (test only)
// ---------------------------------------------------------------------------

/// Writes a short silent WAV, or fails on demand.  Records every text it
/// was asked to render.
#[cfg(test)]
pub struct MockSynthesizer {
    fail: bool,
    spoken: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockSynthesizer {
    pub fn ok() -> Self {
        Self {
            fail: false,
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// `(text, lang)` pairs in call order.
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, lang: &str, dest: &Path) -> Result<(), TtsError> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), lang.to_string()));
        if self.fail {
            return Err(TtsError::Status {
                code: 500,
                body: "synthesis failed".into(),
            });
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dest, spec)
            .map_err(|e| TtsError::Io(std::io::Error::other(e.to_string())))?;
        for _ in 0..160 {
            writer
                .write_sample(0_i16)
                .map_err(|e| TtsError::Io(std::io::Error::other(e.to_string())))?;
        }
        writer
            .finalize()
            .map_err(|e| TtsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
