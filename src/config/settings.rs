//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every struct is `#[serde(default)]` so a partial `settings.toml` only
//! overrides the keys it names.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

/// API key for the chat-completions endpoint.
pub const ENV_LLM_API_KEY: &str = "VOICE_QUERY_LLM_API_KEY";
/// API key for the speech synthesis endpoint.
pub const ENV_TTS_API_KEY: &str = "VOICE_QUERY_TTS_API_KEY";
/// Path to the SQLite database answering questions.
pub const ENV_DATABASE: &str = "VOICE_QUERY_DATABASE";

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the chat model that writes and summarises SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    ///
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key; `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API (e.g. `"qwen2.5:7b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).  SQL generation wants it low.
    pub temperature: f32,
    /// Maximum seconds to wait for a single completion.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:7b".into(),
            temperature: 0.1,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model file stem under the models directory (e.g. `"base.en"`
    /// resolves to `ggml-base.en.bin`).
    pub model: String,
    /// Speech language as an ISO-639-1 code, or `"auto"`.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for continuous capture, utterance segmentation and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// RMS threshold (0.0 – 1.0) above which a 30 ms frame counts as voice.
    pub vad_threshold: f32,
    /// Audio kept from before the first voiced frame, in milliseconds.
    pub pre_roll_ms: u64,
    /// Trailing silence that closes an utterance, in milliseconds.
    pub silence_hangover_ms: u64,
    /// Minimum voiced audio for a segment to be transcribed, in milliseconds.
    pub min_speech_ms: u64,
    /// Segments are cut at this length even if speech continues.
    pub max_utterance_secs: f32,
    /// Input device name, `None` for the system default.
    pub input_device: Option<String>,
    /// Output device name, `None` for the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.015,
            pre_roll_ms: 300,
            silence_hangover_ms: 700,
            min_speech_ms: 150,
            max_utterance_secs: 20.0,
            input_device: None,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Settings for speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/speech` endpoint.
    pub base_url: String,
    /// API key; `None` for local servers.
    pub api_key: Option<String>,
    /// Synthesis model identifier.
    pub model: String,
    /// Voice used when no entry in `voices` matches the language.
    pub default_voice: String,
    /// Voice per two-letter language prefix (`"en"`, `"ur"`, `"hi"` …).
    pub voices: BTreeMap<String, String>,
    /// Speaking rate multiplier.
    pub speed: f32,
    /// Maximum seconds to wait for a synthesis response.
    pub timeout_secs: u64,
    /// Directory holding temporary `tts_*.wav` renderings.
    pub clip_dir: PathBuf,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let mut voices = BTreeMap::new();
        voices.insert("en".to_string(), "alloy".to_string());
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "tts-1".into(),
            default_voice: "alloy".into(),
            voices,
            speed: 1.0,
            timeout_secs: 30,
            clip_dir: PathBuf::from("."),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

/// Settings for the SQLite database the assistant answers questions about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file.  `None` means no database is configured
    /// and every question gets the "couldn't connect" reply.
    pub path: Option<PathBuf>,
    /// Rows considered when summarising a result set.
    pub max_rows: usize,
    /// Tables whose columns are described to the model.
    pub schema_table_limit: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_rows: 100,
            schema_table_limit: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// TurnConfig
// ---------------------------------------------------------------------------

/// Timing of the listen → answer → speak cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Delay after playback ends before recognition resumes.
    pub grace_period_ms: u64,
    /// Delay applied after an interruption stops playback.
    pub interruption_pause_ms: u64,
    /// How often the UI drains its event queue.
    pub ui_poll_interval_ms: u64,
    /// Language tag handed to the synthesizer.
    pub speech_language: String,
    /// Pause the recognizer while an answer is playing.  When `false` the
    /// recognizer stays live and only interruption phrases get through.
    pub pause_recognition_while_speaking: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1_200,
            interruption_pause_ms: 500,
            ui_poll_interval_ms: 100,
            speech_language: "en-US".into(),
            pause_recognition_while_speaking: true,
        }
    }
}

impl TurnConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn interruption_pause(&self) -> Duration {
        Duration::from_millis(self.interruption_pause_ms)
    }

    pub fn ui_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ui_poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Window settings for the transcript view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Window title.
    pub title: String,
    /// Initial inner size `(width, height)` in logical pixels.
    pub window_size: (f32, f32),
    /// Transcript font size.
    pub font_size: f32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Database Voice Assistant".into(),
            window_size: (800.0, 600.0),
            font_size: 14.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_query::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap().with_env_overrides();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub audio: AudioConfig,
    pub tts: TtsConfig,
    pub database: DatabaseConfig,
    pub turn: TurnConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply secrets and the database path from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map).
    /// Empty values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_LLM_API_KEY) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = get(ENV_TTS_API_KEY) {
            self.tts.api_key = Some(key);
        }
        if let Some(path) = get(ENV_DATABASE) {
            self.database.path = Some(PathBuf::from(path));
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.llm.base_url, loaded.llm.base_url);
        assert_eq!(original.llm.model, loaded.llm.model);
        assert_eq!(original.stt.model, loaded.stt.model);
        assert_eq!(original.tts.voices, loaded.tts.voices);
        assert_eq!(original.tts.clip_dir, loaded.tts.clip_dir);
        assert_eq!(original.database.max_rows, loaded.database.max_rows);
        assert_eq!(original.turn.grace_period_ms, loaded.turn.grace_period_ms);
        assert_eq!(original.ui.window_size, loaded.ui.window_size);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.turn.grace_period_ms, 1_200);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[turn]\ngrace_period_ms = 800\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.turn.grace_period_ms, 800);
        assert_eq!(config.turn.interruption_pause_ms, 500);
        assert_eq!(config.llm.model, LlmConfig::default().model);
    }

    #[test]
    fn default_turn_timings() {
        let turn = TurnConfig::default();
        assert_eq!(turn.grace_period(), Duration::from_millis(1_200));
        assert_eq!(turn.interruption_pause(), Duration::from_millis(500));
        assert_eq!(turn.ui_poll_interval(), Duration::from_millis(100));
        assert!(turn.pause_recognition_while_speaking);
    }

    #[test]
    fn env_overrides_apply_non_empty_values() {
        let env: HashMap<&str, &str> = [
            (ENV_LLM_API_KEY, "sk-llm"),
            (ENV_TTS_API_KEY, "  "),
            (ENV_DATABASE, "/data/hr.db"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-llm"));
        assert!(config.tts.api_key.is_none());
        assert_eq!(config.database.path, Some(PathBuf::from("/data/hr.db")));
    }
}
