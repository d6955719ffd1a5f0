//! Configuration module for the voice query assistant.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and environment overrides for
//! secrets.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, DatabaseConfig, LlmConfig, SttConfig, TtsConfig, TurnConfig,
    UiConfig, ENV_DATABASE, ENV_LLM_API_KEY, ENV_TTS_API_KEY,
};
