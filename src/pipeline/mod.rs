//! The turn-taking core: who gets to talk, and when.
//!
//! # Architecture
//!
//! ```text
//!  recognizer thread                    turn-coordinator thread
//!  ┌──────────────────────────┐         ┌─────────────────────────────────┐
//!  │ UtteranceRouter          │ content │ TurnCoordinator                  │
//!  │  classify(text,          │──queue─▶│  Processing: QueryPipeline       │
//!  │    is_speaking, ignore)  │ (epoch) │  Speaking:   pause · speak ·     │
//!  │  Interruption ─▶ stop()  │         │              wait idle · grace · │
//!  └─────────┬────────────────┘         │              drain · resume      │
//!            │                          └───────────────┬─────────────────┘
//!            │        PlaybackController (tts)          │
//!            └───────────────▶  UiEventSink  ◀──────────┘
//!                                    │
//!                              UiEventSource ─▶ app (polls)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_query::config::AppConfig;
//! use voice_query::pipeline::{ui_channel, TurnCoordinator};
//! use voice_query::query::OfflinePipeline;
//! use voice_query::stt::UnavailableRecognizer;
//! # fn playback() -> voice_query::tts::PlaybackController { unimplemented!() }
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let config = AppConfig::default();
//! let (events, mut source) = ui_channel();
//!
//! let handle = TurnCoordinator::new(
//!     Arc::new(UnavailableRecognizer::new("no model")),
//!     Arc::new(OfflinePipeline),
//!     playback(),
//!     events,
//!     config.turn.clone(),
//!     runtime.handle().clone(),
//! )
//! .spawn()
//! .unwrap();
//!
//! for event in source.drain() {
//!     println!("{}: {}", event.kind(), event.text());
//! }
//! handle.shutdown();
//! ```

pub mod classifier;
pub mod events;
pub mod queue;
pub mod router;
pub mod runner;
pub mod state;
pub mod text;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use classifier::{classify, Classification, DropReason, INTERRUPTION_PHRASES};
pub use events::{
    ui_channel, UiEvent, UiEventSink, UiEventSource, STATUS_ERROR, STATUS_INITIALIZING,
    STATUS_INTERRUPTED, STATUS_LISTENING, STATUS_QUERYING, STATUS_SPEAKING,
};
pub use queue::{content_queue, ContentReceiver, ContentSender, Received};
pub use router::UtteranceRouter;
pub use runner::{CoordinatorHandle, TurnCoordinator, TurnError};
pub use state::{IgnoreGuard, IgnoreRecognition, SharedTurnState, TurnState};
pub use text::{sanitize_for_speech, single_line};
