//! Turn coordinator: one question at a time, from queue to spoken answer.
//!
//! [`TurnCoordinator`] owns a dedicated `turn-coordinator` thread.  It
//! starts the recognition source with an [`UtteranceRouter`] as callback and
//! then serves the content queue.
//!
//! # Turn flow
//!
//! ```text
//! Listening ──dequeue──▶ Processing   status "Querying database..."
//!                          block_on(pipeline.answer)   (panic ⇒ Error)
//!                      ▶ Speaking     log "Assistant: …", status "Speaking..."
//!                          pause recognizer (if configured)
//!                          playback.speak → wait until idle (or shutdown)
//!                          grace period with recognition ignored
//!                          advance queue epoch (drain)
//!                          resume recognizer
//!                      ▶ Listening    status "Listening..."
//! ```
//!
//! Interruptions never pass through here: the router stops playback on the
//! recognizer thread and the idle wait returns, so the turn ends through the
//! normal grace/drain/resume sequence exactly once.
//!
//! A panic anywhere in a turn, or a recognition session that dies while the
//! coordinator is idle, ends the run through the same error path: one
//! transcript line, one error status, terminal [`TurnState::Error`].

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;

use crate::config::TurnConfig;
use crate::pipeline::events::{
    UiEventSink, STATUS_ERROR, STATUS_LISTENING, STATUS_QUERYING, STATUS_SPEAKING,
};
use crate::pipeline::queue::{content_queue, ContentReceiver, Received};
use crate::pipeline::router::UtteranceRouter;
use crate::pipeline::state::{IgnoreRecognition, SharedTurnState, TurnState};
use crate::pipeline::text::{sanitize_for_speech, single_line};
use crate::query::QueryPipeline;
use crate::stt::{RecognitionError, RecognitionSource};
use crate::tts::PlaybackController;

/// How often an idle coordinator checks for shutdown and recognizer health,
/// and how often a speaking one checks for shutdown.
const QUEUE_POLL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// TurnError
// ---------------------------------------------------------------------------

/// Failures that end the run.  Everything recoverable is handled closer to
/// its source.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("query pipeline panicked: {0}")]
    PipelinePanicked(String),

    #[error("turn panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// CoordinatorHandle
// ---------------------------------------------------------------------------

pub struct CoordinatorHandle {
    thread: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    state: SharedTurnState,
}

impl CoordinatorHandle {
    pub fn state(&self) -> TurnState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the coordinator to stop and wait for it.  An answer being spoken
    /// is cut short; the rest of the turn runs as usual.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if self.thread.join().is_err() {
            log::error!("turn: coordinator thread panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// TurnCoordinator
// ---------------------------------------------------------------------------

pub struct TurnCoordinator {
    recognizer: Arc<dyn RecognitionSource>,
    pipeline: Arc<dyn QueryPipeline>,
    playback: PlaybackController,
    events: UiEventSink,
    config: TurnConfig,
    runtime: Handle,
    state: SharedTurnState,
    ignore: IgnoreRecognition,
}

impl TurnCoordinator {
    pub fn new(
        recognizer: Arc<dyn RecognitionSource>,
        pipeline: Arc<dyn QueryPipeline>,
        playback: PlaybackController,
        events: UiEventSink,
        config: TurnConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            recognizer,
            pipeline,
            playback,
            events,
            config,
            runtime,
            state: SharedTurnState::new(),
            ignore: IgnoreRecognition::new(),
        }
    }

    /// Start the coordinator thread.  Recognition is started from that
    /// thread; a start failure is reported through the UI like any other
    /// fatal error.
    pub fn spawn(self) -> std::io::Result<CoordinatorHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let state = self.state.clone();
        let flag = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("turn-coordinator".into())
            .spawn(move || self.run(&flag))?;
        Ok(CoordinatorHandle {
            thread,
            shutdown,
            state,
        })
    }

    fn run(self, shutdown: &AtomicBool) {
        let content = match self.start_listening() {
            Ok(content) => content,
            Err(e) => return self.fail(e),
        };

        while !shutdown.load(Ordering::SeqCst) {
            match content.recv_timeout(QUEUE_POLL) {
                Received::Item(question) => {
                    let turn = catch_unwind(AssertUnwindSafe(|| {
                        self.run_turn(&question, &content, shutdown)
                    }));
                    match turn {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return self.fail(e),
                        Err(payload) => {
                            return self.fail(TurnError::Panicked(panic_message(payload.as_ref())))
                        }
                    }
                }
                Received::Timeout => {
                    if let Err(e) = self.recognizer.check() {
                        return self.fail(e.into());
                    }
                }
                Received::Closed => {
                    log::info!("turn: recognition source released its callback");
                    break;
                }
            }
        }
        log::info!("turn: coordinator stopped");
    }

    fn start_listening(&self) -> Result<ContentReceiver, TurnError> {
        let (sender, receiver) = content_queue();
        let router = UtteranceRouter {
            playback: self.playback.clone(),
            ignore: self.ignore.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            content: sender,
            interruption_pause: self.config.interruption_pause(),
        };
        self.recognizer.start(router.into_callback())?;

        self.state.set(TurnState::Listening);
        self.events.status(STATUS_LISTENING);
        log::info!("turn: listening");
        Ok(receiver)
    }

    fn run_turn(
        &self,
        question: &str,
        content: &ContentReceiver,
        shutdown: &AtomicBool,
    ) -> Result<(), TurnError> {
        self.state.set(TurnState::Processing);
        self.events.status(STATUS_QUERYING);
        let answer = self.ask(question)?;

        self.state.set(TurnState::Speaking);
        self.events.log(format!("Assistant: {}", single_line(&answer)));
        self.events.status(STATUS_SPEAKING);

        let paused =
            self.config.pause_recognition_while_speaking && self.control(Control::Pause)?;

        let spoken = sanitize_for_speech(&answer);
        if !spoken.is_empty() {
            self.playback.speak(&spoken, &self.config.speech_language);
        }
        while !self.playback.wait_idle_timeout(QUEUE_POLL) {
            if shutdown.load(Ordering::SeqCst) {
                log::info!("turn: shutting down mid-answer");
                self.playback.stop();
            }
        }

        {
            let _quiet = self.ignore.hold();
            std::thread::sleep(self.config.grace_period());
            let epoch = content.advance_epoch();
            log::debug!("turn: input drained, epoch {epoch}");
        }

        if paused {
            self.control(Control::Resume)?;
        }

        self.state.set(TurnState::Listening);
        self.events.status(STATUS_LISTENING);
        Ok(())
    }

    /// Run the pipeline to completion on this thread.
    fn ask(&self, question: &str) -> Result<String, TurnError> {
        log::info!("turn: question {question:?}");
        let pipeline = Arc::clone(&self.pipeline);
        catch_unwind(AssertUnwindSafe(|| {
            self.runtime.block_on(pipeline.answer(question))
        }))
        .map_err(|payload| TurnError::PipelinePanicked(panic_message(payload.as_ref())))
    }

    /// Pause or resume recognition.  Soft failures are logged and reported
    /// as "not done"; an unavailable session is fatal.
    fn control(&self, op: Control) -> Result<bool, TurnError> {
        let result = match op {
            Control::Pause => self.recognizer.pause(),
            Control::Resume => self.recognizer.resume(),
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                log::warn!("turn: {op:?} failed, continuing: {e}");
                Ok(false)
            }
        }
    }

    fn fail(&self, err: TurnError) {
        log::error!("turn: fatal: {err}");
        self.state.set(TurnState::Error);
        self.playback.stop();
        self.events
            .log(format!("An error occurred in the assistant thread: {err}"));
        self.events.status(STATUS_ERROR);
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::audio::MockSink;
    use crate::pipeline::events::{ui_channel, UiEvent, UiEventSource, STATUS_INTERRUPTED};
    use crate::query::MockPipeline;
    use crate::stt::MockRecognizer;
    use crate::tts::MockSynthesizer;
    use tempfile::{tempdir, TempDir};

    const WAIT: Duration = Duration::from_secs(10);

    struct Harness {
        runtime: tokio::runtime::Runtime,
        _dir: TempDir,
        recognizer: Arc<MockRecognizer>,
        pipeline: Arc<MockPipeline>,
        sink: Arc<MockSink>,
        synth: Arc<MockSynthesizer>,
        events: UiEventSource,
        seen: Vec<UiEvent>,
        playback: PlaybackController,
        handle: Option<CoordinatorHandle>,
    }

    fn test_config() -> TurnConfig {
        TurnConfig {
            grace_period_ms: 50,
            interruption_pause_ms: 20,
            ..TurnConfig::default()
        }
    }

    impl Harness {
        fn start(
            recognizer: MockRecognizer,
            pipeline: MockPipeline,
            play_time: Duration,
            config: TurnConfig,
        ) -> Self {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            let dir = tempdir().unwrap();
            let recognizer = Arc::new(recognizer);
            let pipeline = Arc::new(pipeline);
            let sink = Arc::new(MockSink::new(play_time));
            let synth = Arc::new(MockSynthesizer::ok());
            let playback = PlaybackController::new(
                synth.clone(),
                sink.clone(),
                dir.path(),
                runtime.handle().clone(),
            );
            let (ui, events) = ui_channel();

            let handle = TurnCoordinator::new(
                recognizer.clone(),
                pipeline.clone(),
                playback.clone(),
                ui,
                config,
                runtime.handle().clone(),
            )
            .spawn()
            .unwrap();

            Self {
                runtime,
                _dir: dir,
                recognizer,
                pipeline,
                sink,
                synth,
                events,
                seen: Vec::new(),
                playback,
                handle: Some(handle),
            }
        }

        fn handle(&self) -> &CoordinatorHandle {
            self.handle.as_ref().unwrap()
        }

        /// Collect events until `pred` holds for the collected list.
        fn wait_for(&mut self, pred: impl Fn(&[UiEvent]) -> bool) {
            let deadline = Instant::now() + WAIT;
            loop {
                self.seen.extend(self.events.drain());
                if pred(&self.seen) {
                    return;
                }
                assert!(Instant::now() < deadline, "timed out; events so far: {:?}", self.seen);
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        fn statuses(&self, text: &str) -> usize {
            self.seen
                .iter()
                .filter(|e| **e == UiEvent::Status(text.into()))
                .count()
        }

        fn wait_for_status_count(&mut self, text: &'static str, count: usize) {
            self.wait_for(|events| {
                events
                    .iter()
                    .filter(|e| **e == UiEvent::Status(text.into()))
                    .count()
                    >= count
            });
        }

        fn wait_until_playing(&self) {
            let deadline = Instant::now() + WAIT;
            while !self.playback.is_speaking() {
                assert!(Instant::now() < deadline, "playback never started");
                std::thread::sleep(Duration::from_millis(2));
            }
        }

        fn wait_for_state(&self, state: TurnState) {
            let deadline = Instant::now() + WAIT;
            while self.handle().state() != state {
                assert!(Instant::now() < deadline, "never reached {state:?}");
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.playback.stop();
            if let Some(handle) = self.handle.take() {
                handle.shutdown();
            }
        }
    }

    #[test]
    fn round_trip_emits_statuses_in_order() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("There are 3 employees 👍"),
            Duration::from_millis(50),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        assert!(h.recognizer.say("How many employees are present today?"));
        h.wait_for_status_count(STATUS_LISTENING, 2);

        assert_eq!(
            h.seen,
            vec![
                UiEvent::Status(STATUS_LISTENING.into()),
                UiEvent::Log("You: How many employees are present today?".into()),
                UiEvent::Status(STATUS_QUERYING.into()),
                UiEvent::Log("Assistant: There are 3 employees 👍".into()),
                UiEvent::Status(STATUS_SPEAKING.into()),
                UiEvent::Status(STATUS_LISTENING.into()),
            ]
        );
        assert_eq!(h.pipeline.questions(), vec!["How many employees are present today?"]);
        assert_eq!(
            h.synth.spoken(),
            vec![("There are 3 employees".to_string(), "en-US".to_string())]
        );
        assert_eq!(h.sink.plays(), 1);
        assert_eq!((h.recognizer.pauses(), h.recognizer.resumes()), (1, 1));
        assert!(!h.recognizer.is_paused());
        assert_eq!(h.handle().state(), TurnState::Listening);
    }

    #[test]
    fn recognition_is_paused_while_answering() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("A fairly long answer."),
            Duration::from_millis(300),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer.say("list the employees");
        h.wait_until_playing();
        assert!(h.recognizer.is_paused());
        assert!(!h.recognizer.say("Stop"), "paused source must not deliver");

        h.wait_for_status_count(STATUS_LISTENING, 2);
        assert!(!h.recognizer.is_paused());
    }

    #[test]
    fn interruption_cuts_playback_and_resumes_once() {
        let config = TurnConfig {
            pause_recognition_while_speaking: false,
            ..test_config()
        };
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("A very long answer that goes on and on."),
            Duration::from_secs(30),
            config,
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer.say("list the employees");
        h.wait_for_state(TurnState::Speaking);
        h.wait_until_playing();

        let started = Instant::now();
        assert!(h.recognizer.say("stop"));
        assert!(!h.playback.is_speaking());
        assert!(started.elapsed() < Duration::from_secs(5));

        h.wait_for_status_count(STATUS_LISTENING, 2);
        assert_eq!(h.statuses(STATUS_INTERRUPTED), 1);
        std::thread::sleep(Duration::from_millis(100));
        h.seen.extend(h.events.drain());
        assert_eq!(h.statuses(STATUS_LISTENING), 2);
        assert_eq!(h.pipeline.questions().len(), 1);
        assert_eq!(h.recognizer.pauses(), 0);
        assert_eq!(h.recognizer.resumes(), 0);
    }

    #[test]
    fn input_heard_during_a_turn_is_drained() {
        let config = TurnConfig {
            pause_recognition_while_speaking: false,
            ..test_config()
        };
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("").with_delay(Duration::from_millis(300)),
            Duration::from_millis(10),
            config,
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer.say("first question");
        h.wait_for_state(TurnState::Processing);
        h.recognizer.say("asked while busy");
        h.recognizer.say("and another");

        h.wait_for_status_count(STATUS_LISTENING, 2);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(h.pipeline.questions(), vec!["first question"]);
        assert_eq!(h.handle().state(), TurnState::Listening);

        h.recognizer.say("fresh question");
        h.wait_for_status_count(STATUS_LISTENING, 3);
        assert_eq!(
            h.pipeline.questions(),
            vec!["first question", "fresh question"]
        );
    }

    #[test]
    fn empty_answer_skips_playback() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("🎉"),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);
        h.recognizer.say("how many?");
        h.wait_for_status_count(STATUS_LISTENING, 2);
        assert_eq!(h.sink.plays(), 0);
        assert!(h.synth.spoken().is_empty());
    }

    #[test]
    fn pipeline_panic_is_fatal_and_reported_once() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::panicking(),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer.say("How many employees?");
        h.wait_for_status_count(STATUS_ERROR, 1);
        h.wait_for_state(TurnState::Error);

        h.recognizer.say("Another question");
        std::thread::sleep(Duration::from_millis(150));
        h.seen.extend(h.events.drain());

        let logs: Vec<_> = h
            .seen
            .iter()
            .filter(|e| matches!(e, UiEvent::Log(text) if text.starts_with("An error occurred")))
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].text(),
            "An error occurred in the assistant thread: query pipeline panicked: pipeline exploded"
        );
        assert_eq!(h.statuses(STATUS_ERROR), 1);
        assert_eq!(h.seen.last(), Some(&UiEvent::Status(STATUS_ERROR.into())));
        assert_eq!(h.pipeline.questions(), vec!["How many employees?"]);
        assert!(h.handle().is_finished());
    }

    #[test]
    fn unavailable_recognizer_is_fatal_at_start() {
        let mut h = Harness::start(
            MockRecognizer::failing_start(RecognitionError::Unavailable("no model".into())),
            MockPipeline::replying("unused"),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_ERROR, 1);
        assert_eq!(
            h.seen,
            vec![
                UiEvent::Log(
                    "An error occurred in the assistant thread: \
                     speech recognition unavailable: no model"
                        .into()
                ),
                UiEvent::Status(STATUS_ERROR.into()),
            ]
        );
        h.wait_for_state(TurnState::Error);
    }

    #[test]
    fn soft_control_failures_do_not_end_the_run() {
        let mut h = Harness::start(
            MockRecognizer::failing_control(RecognitionError::Control("busy".into())),
            MockPipeline::replying("Fine."),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);
        h.recognizer.say("how many?");
        h.wait_for_status_count(STATUS_LISTENING, 2);

        assert_eq!(h.recognizer.pauses(), 1);
        assert_eq!(h.recognizer.resumes(), 0, "no resume after a failed pause");
        assert_eq!(h.handle().state(), TurnState::Listening);
    }

    #[test]
    fn unavailable_mid_run_is_fatal() {
        let mut h = Harness::start(
            MockRecognizer::failing_control(RecognitionError::Unavailable("device lost".into())),
            MockPipeline::replying("Fine."),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);
        h.recognizer.say("how many?");
        h.wait_for_status_count(STATUS_ERROR, 1);
        assert_eq!(h.sink.plays(), 0);
        h.wait_for_state(TurnState::Error);
    }

    #[test]
    fn panic_outside_the_pipeline_is_fatal_and_reported_once() {
        let mut h = Harness::start(
            MockRecognizer::panicking_pause(),
            MockPipeline::replying("ok"),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer.say("How many employees?");
        h.wait_for_status_count(STATUS_ERROR, 1);
        h.wait_for_state(TurnState::Error);

        h.recognizer.say("Another question");
        std::thread::sleep(Duration::from_millis(150));
        h.seen.extend(h.events.drain());

        assert_eq!(
            h.seen,
            vec![
                UiEvent::Status(STATUS_LISTENING.into()),
                UiEvent::Log("You: How many employees?".into()),
                UiEvent::Status(STATUS_QUERYING.into()),
                UiEvent::Log("Assistant: ok".into()),
                UiEvent::Status(STATUS_SPEAKING.into()),
                UiEvent::Log(
                    "An error occurred in the assistant thread: \
                     turn panicked: audio driver crashed"
                        .into()
                ),
                UiEvent::Status(STATUS_ERROR.into()),
            ]
        );
        assert_eq!(h.pipeline.questions(), vec!["How many employees?"]);
        assert_eq!(h.sink.plays(), 0);
        assert!(h.handle().is_finished());
    }

    #[test]
    fn session_dying_while_idle_is_fatal() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("unused"),
            Duration::from_millis(10),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);

        h.recognizer
            .break_session(RecognitionError::Unavailable("device unplugged".into()));
        h.wait_for_status_count(STATUS_ERROR, 1);
        h.wait_for_state(TurnState::Error);

        assert_eq!(
            h.seen,
            vec![
                UiEvent::Status(STATUS_LISTENING.into()),
                UiEvent::Log(
                    "An error occurred in the assistant thread: \
                     speech recognition unavailable: device unplugged"
                        .into()
                ),
                UiEvent::Status(STATUS_ERROR.into()),
            ]
        );
        assert!(h.pipeline.questions().is_empty());
        std::thread::sleep(Duration::from_millis(250));
        h.seen.extend(h.events.drain());
        assert_eq!(h.statuses(STATUS_ERROR), 1);
    }

    #[test]
    fn shutdown_cuts_a_long_answer_short() {
        let mut h = Harness::start(
            MockRecognizer::new(),
            MockPipeline::replying("A very long answer that goes on and on."),
            Duration::from_secs(30),
            test_config(),
        );
        h.wait_for_status_count(STATUS_LISTENING, 1);
        h.recognizer.say("list the employees");
        h.wait_for_state(TurnState::Speaking);
        h.wait_until_playing();

        let started = Instant::now();
        if let Some(handle) = h.handle.take() {
            handle.shutdown();
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!h.playback.is_speaking());
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
