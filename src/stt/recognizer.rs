//! Continuous speech recognition with pausable delivery.
//!
//! # Architecture
//!
//! ```text
//!  speech-capture thread (owns the cpal stream)
//!  ┌───────────────────────────────────────────────────────────────────┐
//!  │ AudioChunk ─▶ to_speech_format ─▶ UtteranceSegmenter ─▶ pad ─▶ stt │
//!  └───────────────────────────────────────────────────────────┬───────┘
//!                                                              │ text
//!                                               ┌──────────────▼──────────┐
//!                                               │ delivery gate (Mutex)    │
//!                                               │  paused? drop : callback │
//!                                               └─────────────────────────┘
//! ```
//!
//! The callback runs while the gate is held, so once [`RecognitionSource::pause`]
//! returns no callback is executing and none will start until `resume`.
//! The capture session itself survives pause/resume; only delivery (and the
//! audio captured meanwhile) is suppressed.
//!
//! A cpal stream error or a capture thread that exits unexpectedly marks the
//! session failed.  From then on `pause`/`resume` return
//! [`RecognitionError::Unavailable`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::audio::{to_speech_format, AudioCapture, AudioChunk, UtteranceSegmenter};
use crate::config::AudioConfig;
use crate::stt::engine::{SttEngine, MAX_AUDIO_SAMPLES, MIN_AUDIO_SAMPLES};

const CHUNK_POLL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// One unit of recognized speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub received_at: Instant,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Instant::now(),
        }
    }
}

/// Receives every utterance delivered while the source is not paused.
pub type UtteranceCallback = Box<dyn Fn(Utterance) + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// RecognitionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// The session cannot deliver speech any more.  Fatal for the run.
    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),

    /// A pause or resume request failed; the session keeps its prior state.
    #[error("speech recognition control failed: {0}")]
    Control(String),

    #[error("speech recognition was already started")]
    AlreadyStarted,
}

impl RecognitionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ---------------------------------------------------------------------------
// RecognitionSource trait
// ---------------------------------------------------------------------------

/// A continuous listening session.
///
/// # Contract
///
/// - `start` is called once; the callback is invoked from the source's own
///   thread for every utterance.
/// - `pause` suppresses delivery until `resume` without tearing the session
///   down.  Both are idempotent and cheap enough to call once per turn.
/// - `check` reports a session that died on its own (device unplugged,
///   stream error) while nobody was pausing or resuming it.
pub trait RecognitionSource: Send + Sync {
    fn start(&self, callback: UtteranceCallback) -> Result<(), RecognitionError>;
    fn pause(&self) -> Result<(), RecognitionError>;
    fn resume(&self) -> Result<(), RecognitionError>;
    fn check(&self) -> Result<(), RecognitionError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RecognitionSource>) {}
};

// ---------------------------------------------------------------------------
// Session state shared between the handle and the capture thread
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    /// `true` while delivery is paused.  Held for the duration of a callback.
    gate: Mutex<bool>,
    failure: Mutex<Option<String>>,
    started: AtomicBool,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock_gate(&self) -> MutexGuard<'_, bool> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fail(&self, reason: impl Into<String>) {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            let reason = reason.into();
            log::error!("recognizer: session failed: {reason}");
            *slot = Some(reason);
        }
    }

    fn check_alive(&self) -> Result<(), RecognitionError> {
        match self.failure() {
            Some(reason) => Err(RecognitionError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn set_paused(&self, paused: bool) -> Result<(), RecognitionError> {
        self.check_alive()?;
        let mut gate = self.lock_gate();
        if *gate != paused {
            log::debug!("recognizer: {}", if paused { "paused" } else { "resumed" });
        }
        *gate = paused;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        *self.lock_gate()
    }
}

/// Marks the session failed if the capture thread leaves its loop for any
/// reason other than shutdown (including a panic).
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.0.shutdown.load(Ordering::SeqCst) {
            self.0.fail("capture thread exited");
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSession: per-chunk processing on the capture thread
// ---------------------------------------------------------------------------

struct SpeechSession {
    stt: Arc<dyn SttEngine>,
    segmenter: UtteranceSegmenter,
    shared: Arc<Shared>,
    callback: UtteranceCallback,
    was_paused: bool,
}

impl SpeechSession {
    fn process(&mut self, chunk: &AudioChunk) {
        if self.shared.is_paused() {
            if !self.was_paused {
                self.segmenter.reset();
                self.was_paused = true;
            }
            return;
        }
        self.was_paused = false;

        let speech = to_speech_format(&chunk.samples, chunk.sample_rate, chunk.channels);
        for segment in self.segmenter.push(&speech) {
            if let Some(text) = self.transcribe(segment) {
                self.deliver(text);
            }
        }
    }

    fn transcribe(&self, mut segment: Vec<f32>) -> Option<String> {
        if segment.len() < MIN_AUDIO_SAMPLES {
            segment.resize(MIN_AUDIO_SAMPLES, 0.0);
        }
        segment.truncate(MAX_AUDIO_SAMPLES);

        match self.stt.transcribe(&segment) {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("recognizer: transcription failed: {e}");
                None
            }
        }
    }

    /// Deliver under the gate.  Returns `false` when paused.
    fn deliver(&self, text: String) -> bool {
        let gate = self.shared.lock_gate();
        if *gate {
            log::debug!("recognizer: dropped utterance transcribed after pause");
            return false;
        }
        (self.callback)(Utterance::new(text));
        drop(gate);
        true
    }
}

// ---------------------------------------------------------------------------
// ContinuousRecognizer
// ---------------------------------------------------------------------------

/// Microphone + Whisper recognition source.
pub struct ContinuousRecognizer {
    stt: Arc<dyn SttEngine>,
    audio: AudioConfig,
    shared: Arc<Shared>,
}

impl ContinuousRecognizer {
    pub fn new(stt: Arc<dyn SttEngine>, audio: AudioConfig) -> Self {
        Self {
            stt,
            audio,
            shared: Arc::new(Shared::default()),
        }
    }

    fn capture_loop(
        session: &mut SpeechSession,
        capture: &AudioCapture,
        shared: &Arc<Shared>,
    ) -> Result<(), RecognitionError> {
        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let on_error = {
            let shared = Arc::clone(shared);
            move |err: cpal::StreamError| shared.fail(err.to_string())
        };
        let _stream = capture
            .start(tx, on_error)
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        while !shared.shutdown.load(Ordering::SeqCst) && shared.failure().is_none() {
            match rx.recv_timeout(CHUNK_POLL) {
                Ok(chunk) => session.process(&chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    shared.fail("audio stream closed");
                }
            }
        }
        Ok(())
    }
}

impl RecognitionSource for ContinuousRecognizer {
    fn start(&self, callback: UtteranceCallback) -> Result<(), RecognitionError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::AlreadyStarted);
        }

        let mut session = SpeechSession {
            stt: Arc::clone(&self.stt),
            segmenter: UtteranceSegmenter::from_audio_config(&self.audio),
            shared: Arc::clone(&self.shared),
            callback,
            was_paused: false,
        };
        let shared = Arc::clone(&self.shared);
        let device = self.audio.input_device.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), RecognitionError>>(1);

        std::thread::Builder::new()
            .name("speech-capture".into())
            .spawn(move || {
                let _guard = ExitGuard(Arc::clone(&shared));

                // The cpal stream is not Send; it must be created and dropped here.
                let capture = match AudioCapture::new(device.as_deref()) {
                    Ok(capture) => capture,
                    Err(e) => {
                        let _ = ready_tx.send(Err(RecognitionError::Unavailable(e.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                if let Err(e) = Self::capture_loop(&mut session, &capture, &shared) {
                    shared.fail(e.to_string());
                }
            })
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| RecognitionError::Unavailable("capture thread exited during start".into()))?;
        if let Err(e) = &ready {
            self.shared.fail(e.to_string());
        } else {
            log::info!("recognizer: listening");
        }
        ready
    }

    fn pause(&self) -> Result<(), RecognitionError> {
        self.shared.set_paused(true)
    }

    fn resume(&self) -> Result<(), RecognitionError> {
        self.shared.set_paused(false)
    }

    fn check(&self) -> Result<(), RecognitionError> {
        self.shared.check_alive()
    }
}

impl Drop for ContinuousRecognizer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// UnavailableRecognizer
// ---------------------------------------------------------------------------

/// Stand-in when speech recognition cannot be set up at all (e.g. no Whisper
/// model installed).  Every call fails with [`RecognitionError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> RecognitionError {
        RecognitionError::Unavailable(self.reason.clone())
    }
}

impl RecognitionSource for UnavailableRecognizer {
    fn start(&self, _callback: UtteranceCallback) -> Result<(), RecognitionError> {
        Err(self.error())
    }

    fn pause(&self) -> Result<(), RecognitionError> {
        Err(self.error())
    }

    fn resume(&self) -> Result<(), RecognitionError> {
        Err(self.error())
    }

    fn check(&self) -> Result<(), RecognitionError> {
        Err(self.error())
    }
}

// ---------------------------------------------------------------------------
// MockRecognizer (test only)
// ---------------------------------------------------------------------------

/// Scriptable recognition source.  Tests push utterances with [`say`] and
/// inspect how often the coordinator paused and resumed.
///
/// [`say`]: MockRecognizer::say
#[cfg(test)]
#[derive(Default)]
pub struct MockRecognizer {
    callback: Mutex<Option<UtteranceCallback>>,
    paused: Mutex<bool>,
    pauses: std::sync::atomic::AtomicUsize,
    resumes: std::sync::atomic::AtomicUsize,
    fail_start: Option<RecognitionError>,
    fail_control: Option<RecognitionError>,
    broken: Mutex<Option<RecognitionError>>,
    panic_on_pause: bool,
}

#[cfg(test)]
impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start(err: RecognitionError) -> Self {
        Self {
            fail_start: Some(err),
            ..Self::default()
        }
    }

    pub fn failing_control(err: RecognitionError) -> Self {
        Self {
            fail_control: Some(err),
            ..Self::default()
        }
    }

    /// A source whose `pause` panics.
    pub fn panicking_pause() -> Self {
        Self {
            panic_on_pause: true,
            ..Self::default()
        }
    }

    /// Make every later `check` fail with `err`, as a session that lost its
    /// device would.
    pub fn break_session(&self, err: RecognitionError) {
        *self.broken.lock().unwrap() = Some(err);
    }

    /// Deliver `text` unless paused.  Returns whether it was delivered.
    pub fn say(&self, text: &str) -> bool {
        let paused = self.paused.lock().unwrap();
        if *paused {
            return false;
        }
        match self.callback.lock().unwrap().as_ref() {
            Some(callback) => {
                callback(Utterance::new(text));
                true
            }
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap()
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RecognitionSource for MockRecognizer {
    fn start(&self, callback: UtteranceCallback) -> Result<(), RecognitionError> {
        if let Some(err) = &self.fail_start {
            return Err(err.clone());
        }
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn pause(&self) -> Result<(), RecognitionError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_pause {
            panic!("audio driver crashed");
        }
        if let Some(err) = &self.fail_control {
            return Err(err.clone());
        }
        *self.paused.lock().unwrap() = true;
        Ok(())
    }

    fn resume(&self) -> Result<(), RecognitionError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fail_control {
            return Err(err.clone());
        }
        *self.paused.lock().unwrap() = false;
        Ok(())
    }

    fn check(&self) -> Result<(), RecognitionError> {
        match self.broken.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SegmenterConfig, VadDetector, FRAME_SAMPLES};
    use crate::stt::engine::{MockSttEngine, SttError};

    fn session(stt: MockSttEngine) -> (SpeechSession, Arc<Mutex<Vec<String>>>) {
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        let limits = SegmenterConfig {
            pre_roll_frames: 1,
            hangover_frames: 2,
            min_speech_frames: 1,
            max_frames: 100,
        };
        let session = SpeechSession {
            stt: Arc::new(stt),
            segmenter: UtteranceSegmenter::new(VadDetector::new(0.01), limits),
            shared: Arc::new(Shared::default()),
            callback: Box::new(move |u: Utterance| sink.lock().unwrap().push(u.text)),
            was_paused: false,
        };
        (session, heard)
    }

    fn chunk(frames: usize, level: f32) -> AudioChunk {
        AudioChunk {
            samples: vec![level; frames * FRAME_SAMPLES],
            sample_rate: 16_000,
            channels: 1,
        }
    }

    #[test]
    fn utterance_is_transcribed_and_delivered() {
        let (mut session, heard) = session(MockSttEngine::ok("how many employees"));
        session.process(&chunk(3, 0.5));
        session.process(&chunk(3, 0.0));
        assert_eq!(*heard.lock().unwrap(), vec!["how many employees".to_string()]);
    }

    #[test]
    fn short_segments_are_padded_to_whisper_minimum() {
        // Three frames is far below 0.5 s; the mock rejects short audio, so
        // delivery proves padding happened.
        let (mut session, heard) = session(MockSttEngine::ok("stop"));
        session.process(&chunk(1, 0.5));
        session.process(&chunk(2, 0.0));
        assert_eq!(heard.lock().unwrap().len(), 1);
    }

    #[test]
    fn nothing_is_delivered_while_paused() {
        let (mut session, heard) = session(MockSttEngine::ok("hello"));
        session.shared.set_paused(true).unwrap();
        session.process(&chunk(3, 0.5));
        session.process(&chunk(3, 0.0));
        assert!(heard.lock().unwrap().is_empty());

        session.shared.set_paused(false).unwrap();
        session.process(&chunk(3, 0.5));
        session.process(&chunk(3, 0.0));
        assert_eq!(heard.lock().unwrap().len(), 1);
    }

    #[test]
    fn speech_straddling_a_pause_is_discarded() {
        let (mut session, heard) = session(MockSttEngine::ok("echo"));
        session.process(&chunk(3, 0.5));
        session.shared.set_paused(true).unwrap();
        session.process(&chunk(1, 0.0));
        session.shared.set_paused(false).unwrap();
        session.process(&chunk(3, 0.0));
        assert!(heard.lock().unwrap().is_empty());
    }

    #[test]
    fn transcription_failure_is_not_delivered() {
        let (mut session, heard) =
            session(MockSttEngine::err(SttError::Transcription("boom".into())));
        session.process(&chunk(3, 0.5));
        session.process(&chunk(3, 0.0));
        assert!(heard.lock().unwrap().is_empty());
        assert!(session.shared.failure().is_none());
    }

    #[test]
    fn empty_transcripts_are_not_delivered() {
        let (mut session, heard) = session(MockSttEngine::ok("   "));
        session.process(&chunk(3, 0.5));
        session.process(&chunk(3, 0.0));
        assert!(heard.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_session_rejects_pause_and_resume() {
        let shared = Shared::default();
        assert!(shared.set_paused(true).is_ok());
        shared.fail("device unplugged");
        shared.fail("second failure is ignored");
        assert_eq!(
            shared.set_paused(false),
            Err(RecognitionError::Unavailable("device unplugged".into()))
        );
        assert_eq!(
            shared.check_alive(),
            Err(RecognitionError::Unavailable("device unplugged".into()))
        );
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let recognizer =
            ContinuousRecognizer::new(Arc::new(MockSttEngine::ok("x")), AudioConfig::default());
        assert!(recognizer.pause().is_ok());
        assert!(recognizer.pause().is_ok());
        assert!(recognizer.resume().is_ok());
        assert!(recognizer.resume().is_ok());
        assert_eq!(recognizer.check(), Ok(()));
    }

    #[test]
    fn unavailable_recognizer_fails_every_call() {
        let recognizer = UnavailableRecognizer::new("no whisper model");
        let err = recognizer.start(Box::new(|_| {})).unwrap_err();
        assert!(err.is_fatal());
        assert!(recognizer.pause().unwrap_err().is_fatal());
        assert!(recognizer.resume().unwrap_err().is_fatal());
        assert!(recognizer.check().unwrap_err().is_fatal());
    }

    #[test]
    fn control_errors_are_not_fatal() {
        assert!(!RecognitionError::Control("busy".into()).is_fatal());
        assert!(!RecognitionError::AlreadyStarted.is_fatal());
    }

    #[test]
    fn mock_recognizer_respects_pause() {
        let mock = MockRecognizer::new();
        let heard = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&heard);
        mock.start(Box::new(move |_| *counter.lock().unwrap() += 1))
            .unwrap();

        assert!(mock.say("one"));
        mock.pause().unwrap();
        assert!(!mock.say("two"));
        mock.resume().unwrap();
        assert!(mock.say("three"));

        assert_eq!(*heard.lock().unwrap(), 2);
        assert_eq!((mock.pauses(), mock.resumes()), (1, 1));
    }
}
