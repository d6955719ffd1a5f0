//! Speech-to-text: the Whisper engine and the continuous recognition source.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │              RecognitionSource (trait)                      │
//! │   start(callback) · pause() · resume()                      │
//! │                                                            │
//! │   ┌──────────────────────┐      ┌──────────────────────┐   │
//! │   │ ContinuousRecognizer │─────▶│  SttEngine (trait)    │   │
//! │   │  capture + segment   │      │  WhisperEngine        │   │
//! │   │  + delivery gate     │      │  MockSttEngine (test) │   │
//! │   └──────────────────────┘      └──────────────────────┘   │
//! │   ┌──────────────────────┐                                 │
//! │   │ UnavailableRecognizer│  (no model: start() fails)      │
//! │   └──────────────────────┘                                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_query::config::AudioConfig;
//! use voice_query::stt::{ContinuousRecognizer, RecognitionSource, TranscribeParams, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model not found");
//! let recognizer = ContinuousRecognizer::new(Arc::new(engine), AudioConfig::default());
//! recognizer
//!     .start(Box::new(|u| println!("heard: {}", u.text)))
//!     .unwrap();
//! ```

pub mod engine;
pub mod recognizer;
pub mod transcribe;

pub use engine::{SttEngine, SttError, WhisperEngine, MAX_AUDIO_SAMPLES, MIN_AUDIO_SAMPLES};
pub use recognizer::{
    ContinuousRecognizer, RecognitionError, RecognitionSource, UnavailableRecognizer, Utterance,
    UtteranceCallback,
};
pub use transcribe::{clean_transcript, SamplingStrategy, TranscribeParams, TranscriptionResult};

#[cfg(test)]
pub use engine::MockSttEngine;
#[cfg(test)]
pub use recognizer::MockRecognizer;
