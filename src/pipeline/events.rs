//! Ordered events from the turn machinery to the presentation layer.
//!
//! The sink side is cloned into the coordinator and the utterance router;
//! the single source is polled by the UI on its own schedule.  Sending never
//! blocks and never fails the caller: once the UI is gone events are
//! dropped.

use tokio::sync::mpsc;

pub const STATUS_INITIALIZING: &str = "Initializing...";
pub const STATUS_LISTENING: &str = "Listening...";
pub const STATUS_QUERYING: &str = "Querying database...";
pub const STATUS_SPEAKING: &str = "Speaking...";
pub const STATUS_INTERRUPTED: &str = "Listening resumed after interruption...";
pub const STATUS_ERROR: &str = "Error! Restart required.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A transcript line.
    Log(String),
    /// Replaces the status line.
    Status(String),
}

impl UiEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            UiEvent::Log(_) => "log",
            UiEvent::Status(_) => "status",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            UiEvent::Log(text) | UiEvent::Status(text) => text,
        }
    }
}

#[derive(Clone)]
pub struct UiEventSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiEventSink {
    pub fn emit(&self, event: UiEvent) {
        log::debug!("ui: {} {:?}", event.kind(), event.text());
        if self.tx.send(event).is_err() {
            log::trace!("ui: event dropped, no consumer");
        }
    }

    pub fn log(&self, text: impl Into<String>) {
        self.emit(UiEvent::Log(text.into()));
    }

    pub fn status(&self, text: impl Into<String>) {
        self.emit(UiEvent::Status(text.into()));
    }
}

pub struct UiEventSource {
    rx: mpsc::UnboundedReceiver<UiEvent>,
}

impl UiEventSource {
    /// Everything emitted since the last call, in emission order.  Empty
    /// when nothing is pending.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn ui_channel() -> (UiEventSink, UiEventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiEventSink { tx }, UiEventSource { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_emission_order_across_clones() {
        let (sink, mut source) = ui_channel();
        let other = sink.clone();

        sink.log("You: hello");
        other.status(STATUS_QUERYING);
        sink.status(STATUS_SPEAKING);

        assert_eq!(
            source.drain(),
            vec![
                UiEvent::Log("You: hello".into()),
                UiEvent::Status(STATUS_QUERYING.into()),
                UiEvent::Status(STATUS_SPEAKING.into()),
            ]
        );
        assert!(source.drain().is_empty());
    }

    #[test]
    fn emitting_without_a_consumer_is_harmless() {
        let (sink, source) = ui_channel();
        drop(source);
        sink.log("nobody listens");
    }

    #[test]
    fn events_report_kind_and_text() {
        let event = UiEvent::Status(STATUS_LISTENING.into());
        assert_eq!(event.kind(), "status");
        assert_eq!(event.text(), "Listening...");
        assert_eq!(UiEvent::Log("x".into()).kind(), "log");
    }

    #[test]
    fn sink_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UiEventSink>();
    }
}
