//! Per-utterance handling on the recognizer's delivery thread.
//!
//! Interruptions act on the playback controller directly so they never wait
//! behind a turn; content is echoed to the transcript and queued for the
//! coordinator.  Nothing here blocks on the coordinator.

use std::time::Duration;

use crate::pipeline::classifier::{classify, Classification, DropReason};
use crate::pipeline::events::{UiEventSink, STATUS_INTERRUPTED};
use crate::pipeline::queue::ContentSender;
use crate::pipeline::state::{IgnoreRecognition, SharedTurnState, TurnState};
use crate::stt::{Utterance, UtteranceCallback};
use crate::tts::PlaybackController;

pub struct UtteranceRouter {
    pub(crate) playback: PlaybackController,
    pub(crate) ignore: IgnoreRecognition,
    pub(crate) state: SharedTurnState,
    pub(crate) events: UiEventSink,
    pub(crate) content: ContentSender,
    pub(crate) interruption_pause: Duration,
}

impl UtteranceRouter {
    pub fn handle(&self, utterance: &Utterance) -> Classification {
        if self.state.get() == TurnState::Error {
            return Classification::Dropped(DropReason::Halted);
        }

        let classification = classify(
            &utterance.text,
            self.playback.is_speaking(),
            self.ignore.is_set(),
        );

        match &classification {
            Classification::Interruption => {
                log::info!("turn: interruption {:?}", utterance.text);
                self.playback.stop();
                std::thread::sleep(self.interruption_pause);
                self.events.status(STATUS_INTERRUPTED);
            }
            Classification::Content(text) => {
                self.events.log(format!("You: {text}"));
                let state = self.state.get();
                if state.is_busy() {
                    log::debug!("turn: {text:?} waits behind a turn in {}", state.label());
                }
                if self.content.send(text.clone()) {
                    log::debug!(
                        "turn: queued {text:?} {}ms after recognition",
                        utterance.received_at.elapsed().as_millis()
                    );
                } else {
                    log::debug!("turn: coordinator gone, {text:?} not queued");
                }
            }
            Classification::Dropped(reason) => {
                log::debug!("turn: dropped {:?} ({reason:?})", utterance.text);
            }
        }
        classification
    }

    pub fn into_callback(self) -> UtteranceCallback {
        Box::new(move |utterance| {
            self.handle(&utterance);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audio::MockSink;
    use crate::pipeline::events::{ui_channel, UiEvent, UiEventSource};
    use crate::pipeline::queue::{content_queue, ContentReceiver, Received};
    use crate::tts::MockSynthesizer;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _runtime: tokio::runtime::Runtime,
        _dir: TempDir,
        router: UtteranceRouter,
        events: UiEventSource,
        queue: ContentReceiver,
    }

    fn fixture(play_time: Duration) -> Fixture {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let dir = tempdir().unwrap();
        let playback = PlaybackController::new(
            Arc::new(MockSynthesizer::ok()),
            Arc::new(MockSink::new(play_time)),
            dir.path(),
            runtime.handle().clone(),
        );
        let (sink, events) = ui_channel();
        let (content, queue) = content_queue();
        Fixture {
            router: UtteranceRouter {
                playback,
                ignore: IgnoreRecognition::new(),
                state: SharedTurnState::new(),
                events: sink,
                content,
                interruption_pause: Duration::from_millis(20),
            },
            _runtime: runtime,
            _dir: dir,
            events,
            queue,
        }
    }

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn content_is_echoed_and_queued() {
        let mut fx = fixture(Duration::from_millis(10));
        let result = fx
            .router
            .handle(&Utterance::new("How many employees are present today?"));

        assert!(matches!(result, Classification::Content(_)));
        assert_eq!(
            fx.events.drain(),
            vec![UiEvent::Log("You: How many employees are present today?".into())]
        );
        assert_eq!(
            fx.queue.recv_timeout(SHORT),
            Received::Item("How many employees are present today?".into())
        );
    }

    #[test]
    fn interruption_stops_playback_without_queueing() {
        let mut fx = fixture(Duration::from_secs(30));
        fx.router.playback.speak("a very long answer", "en-US");
        assert!(fx.router.playback.is_speaking());

        let result = fx.router.handle(&Utterance::new("Stop!"));

        assert_eq!(result, Classification::Interruption);
        assert!(!fx.router.playback.is_speaking());
        assert_eq!(
            fx.events.drain(),
            vec![UiEvent::Status(STATUS_INTERRUPTED.into())]
        );
        assert_eq!(fx.queue.recv_timeout(SHORT), Received::Timeout);
    }

    #[test]
    fn own_voice_is_not_queued() {
        let mut fx = fixture(Duration::from_secs(30));
        fx.router.playback.speak("There are 42 employees.", "en-US");

        let result = fx.router.handle(&Utterance::new("There are 42 employees."));

        assert_eq!(result, Classification::Dropped(DropReason::SelfEcho));
        assert!(fx.router.playback.is_speaking());
        assert!(fx.events.drain().is_empty());
        assert_eq!(fx.queue.recv_timeout(SHORT), Received::Timeout);
        fx.router.playback.stop();
    }

    #[test]
    fn content_during_a_busy_turn_is_still_queued() {
        let mut fx = fixture(Duration::from_millis(10));
        fx.router.state.set(TurnState::Processing);

        let result = fx.router.handle(&Utterance::new("list the departments"));

        assert!(matches!(result, Classification::Content(_)));
        assert_eq!(
            fx.events.drain(),
            vec![UiEvent::Log("You: list the departments".into())]
        );
        assert_eq!(
            fx.queue.recv_timeout(SHORT),
            Received::Item("list the departments".into())
        );
    }

    #[test]
    fn ignore_window_and_halted_state_drop_input() {
        let mut fx = fixture(Duration::from_millis(10));

        let guard = fx.router.ignore.hold();
        assert_eq!(
            fx.router.handle(&Utterance::new("list employees")),
            Classification::Dropped(DropReason::Ignoring)
        );
        drop(guard);

        fx.router.state.set(TurnState::Error);
        assert_eq!(
            fx.router.handle(&Utterance::new("list employees")),
            Classification::Dropped(DropReason::Halted)
        );
        assert!(fx.events.drain().is_empty());
        assert_eq!(fx.queue.recv_timeout(SHORT), Received::Timeout);
    }
}
