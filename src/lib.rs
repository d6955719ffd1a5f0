//! Voice-driven database assistant.
//!
//! Spoken questions are recognized continuously, answered against a SQLite
//! database through an LLM-written query, and read back aloud.  Saying
//! "stop" while an answer plays cuts it short.
//!
//! | module       | role                                                   |
//! |--------------|--------------------------------------------------------|
//! | [`audio`]    | microphone capture, VAD segmentation, speaker output   |
//! | [`stt`]      | Whisper transcription and the continuous recognizer    |
//! | [`tts`]      | speech synthesis and the playback controller           |
//! | [`query`]    | intent, SQL generation, execution, repair, summary     |
//! | [`pipeline`] | turn coordination, interruption handling, UI events    |
//! | [`app`]      | egui transcript window                                 |
//! | [`config`]   | `settings.toml`, environment overrides, paths          |

pub mod app;
pub mod audio;
pub mod config;
pub mod pipeline;
pub mod query;
pub mod stt;
pub mod tts;
