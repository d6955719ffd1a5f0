//! Playback controller: owns "is speaking" and cancellable playback.
//!
//! # Synchronisation
//!
//! ```text
//!            ┌──────────────── Mutex<Slot> ────────────────┐
//!  speak() ─▶│ stop old · install {id, StopSignal} · flag=1 │──spawn──▶ tts-playback
//!  stop()  ─▶│ take active · trigger · flag=0 · notify      │          (synthesize →
//!  finish(id)│ if active.id == id: clear · flag=0 · notify  │◀─guard── play → drop clip)
//!            └──────────────────────────────────────────────┘
//!  wait_idle_timeout(d): Condvar wait until the slot is empty or d passes
//! ```
//!
//! The `speaking` flag is only written while the slot mutex is held, so it
//! can never disagree with the slot for longer than a lock hold.  A playback
//! thread finishing after a `stop()` finds a different (or no) id in the slot
//! and leaves it alone.  The finish call lives in a drop guard, so the flag
//! is cleared on success, cancellation, synthesis error and panic alike.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;

use crate::audio::{AudioClip, AudioSink, PlaybackError, PlaybackOutcome, StopSignal};
use crate::tts::clip::TempClip;
use crate::tts::synth::{SpeechSynthesizer, TtsError};

// ---------------------------------------------------------------------------
// SpeakError
// ---------------------------------------------------------------------------

/// Why a single answer produced no (or partial) audio.  Logged by the
/// playback thread, never returned to callers of `speak`.
#[derive(Debug, Error)]
pub enum SpeakError {
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] TtsError),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct Active {
    id: u64,
    stop: StopSignal,
}

#[derive(Default)]
struct Slot {
    active: Option<Active>,
    next_id: u64,
}

struct Inner {
    synth: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    clip_dir: PathBuf,
    runtime: Handle,
    speaking: AtomicBool,
    slot: Mutex<Slot>,
    idle: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot if `id` still owns it.
    fn finish(&self, id: u64) {
        let mut slot = self.lock();
        if slot.active.as_ref().is_some_and(|a| a.id == id) {
            slot.active = None;
            self.speaking.store(false, Ordering::SeqCst);
            self.idle.notify_all();
        }
    }

    fn play_once(&self, text: &str, lang: &str, stop: &StopSignal) -> Result<PlaybackOutcome, SpeakError> {
        if text.trim().is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }

        let clip = TempClip::create_in(&self.clip_dir);
        self.runtime
            .block_on(self.synth.synthesize(text, lang, clip.path()))?;

        if stop.is_triggered() {
            return Ok(PlaybackOutcome::Cancelled);
        }

        let audio = AudioClip::from_wav(clip.path())?;
        Ok(self.sink.play(&audio, stop)?)
    }
}

struct FinishGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.inner.finish(self.id);
    }
}

// ---------------------------------------------------------------------------
// PlaybackController
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone controls the same output.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use voice_query::audio::CpalSink;
/// use voice_query::config::TtsConfig;
/// use voice_query::tts::{ApiSynthesizer, PlaybackController};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let tts = TtsConfig::default();
/// let playback = PlaybackController::new(
///     Arc::new(ApiSynthesizer::from_config(&tts)),
///     Arc::new(CpalSink::new(None)),
///     tts.clip_dir.clone(),
///     runtime.handle().clone(),
/// );
///
/// playback.speak("There are 42 employees.", "en-US");
/// while !playback.wait_idle_timeout(Duration::from_millis(100)) {}
/// ```
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        clip_dir: impl Into<PathBuf>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                synth,
                sink,
                clip_dir: clip_dir.into(),
                runtime,
                speaking: AtomicBool::new(false),
                slot: Mutex::new(Slot::default()),
                idle: Condvar::new(),
            }),
        }
    }

    /// Cancel whatever is playing, then render and play `text` in the
    /// background.  Returns immediately with `is_speaking() == true`.
    pub fn speak(&self, text: &str, lang: &str) {
        let stop = StopSignal::new();
        let id = {
            let mut slot = self.inner.lock();
            if let Some(previous) = slot.active.take() {
                previous.stop.trigger();
                log::debug!("playback: #{} superseded", previous.id);
            }
            slot.next_id += 1;
            let id = slot.next_id;
            slot.active = Some(Active {
                id,
                stop: stop.clone(),
            });
            self.inner.speaking.store(true, Ordering::SeqCst);
            id
        };

        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let lang = lang.to_string();
        let spawned = std::thread::Builder::new()
            .name("tts-playback".into())
            .spawn(move || {
                let guard = FinishGuard {
                    inner: Arc::clone(&inner),
                    id,
                };
                match inner.play_once(&text, &lang, &stop) {
                    Ok(outcome) => log::debug!("playback: #{id} {outcome:?}"),
                    Err(e) => log::warn!("playback: #{id} produced no audio: {e}"),
                }
                drop(guard);
            });

        if let Err(e) = spawned {
            log::error!("playback: could not start playback thread: {e}");
            self.inner.finish(id);
        }
    }

    /// Halt playback now.  Idempotent; safe from any thread, including right
    /// after playback completed on its own.
    pub fn stop(&self) {
        let mut slot = self.inner.lock();
        if let Some(active) = slot.active.take() {
            active.stop.trigger();
            self.inner.speaking.store(false, Ordering::SeqCst);
            self.inner.idle.notify_all();
            log::info!("playback: #{} stopped", active.id);
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    /// Block until nothing is playing or `timeout` passes.  Returns `true`
    /// if playback is idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let slot = self.inner.lock();
        let (slot, _) = self
            .inner
            .idle
            .wait_timeout_while(slot, timeout, |s| s.active.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        slot.active.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
