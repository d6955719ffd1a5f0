//! Transcription parameters, result type and transcript cleanup.
//!
//! [`TranscribeParams`] carries all settings that control a single Whisper
//! inference run.  [`TranscriptionResult`] is returned by
//! [`WhisperEngine::transcribe_full`](crate::stt::WhisperEngine::transcribe_full).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SttConfig;

// ---------------------------------------------------------------------------
// SamplingStrategy
// ---------------------------------------------------------------------------

/// Mirrors `whisper_rs::SamplingStrategy` but is owned and `Clone`.
///
/// Greedy keeps turn latency low; beam search is slightly more accurate at
/// 2-4× the cost.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    Greedy { best_of: i32 },
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// All parameters for a single Whisper transcription run.
///
/// ```
/// use voice_query::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     language: "auto".into(),
///     ..TranscribeParams::default()
/// };
/// assert_eq!(params.language, "auto");
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 language code, or `"auto"` for detection.
    pub language: String,
    pub strategy: SamplingStrategy,
    /// CPU threads handed to Whisper.  Defaults to [`optimal_threads()`].
    pub n_threads: i32,
    /// Suppress Whisper's progress output to stderr.
    pub suppress_progress: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
            suppress_progress: true,
        }
    }
}

impl TranscribeParams {
    pub fn from_config(stt: &SttConfig) -> Self {
        Self {
            language: stt.language.clone(),
            ..Self::default()
        }
    }
}

/// Thread count for inference, capped at 8 (Whisper stops scaling there).
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// TranscriptionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// Cleaned transcript; empty when the clip held no words.
    pub text: String,
    /// Number of segments Whisper produced.
    pub segments: usize,
    /// Wall-clock inference time in milliseconds.
    pub duration_ms: u128,
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]|\([^)]*\)|\*[^*]*\*").expect("valid regex")
});

/// Remove Whisper's non-speech annotations (`[BLANK_AUDIO]`, `(music)`,
/// `*coughs*`) and collapse whitespace.
///
/// ```
/// use voice_query::stt::clean_transcript;
///
/// assert_eq!(clean_transcript(" [BLANK_AUDIO] "), "");
/// assert_eq!(clean_transcript("(wind) How many   employees?"), "How many employees?");
/// ```
pub fn clean_transcript(raw: &str) -> String {
    let stripped = ANNOTATION.replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_english() {
        assert_eq!(TranscribeParams::default().language, "en");
    }

    #[test]
    fn params_follow_config_language() {
        let stt = SttConfig {
            language: "hi".into(),
            ..SttConfig::default()
        };
        assert_eq!(TranscribeParams::from_config(&stt).language, "hi");
    }

    #[test]
    fn clean_transcript_keeps_plain_speech() {
        assert_eq!(clean_transcript("Stop."), "Stop.");
        assert_eq!(clean_transcript("  hold on\n"), "hold on");
    }

    #[test]
    fn clean_transcript_drops_every_annotation_kind() {
        assert_eq!(clean_transcript("[Music] *sigh* (applause)"), "");
    }
}
