//! egui front end: a scrolling transcript and a one-line status.
//!
//! The window never drives the turn machinery.  It only drains the
//! [`UiEventSource`] on a fixed schedule and renders what it got:
//!
//! ```text
//!  ┌─────────────────────────────────────┐
//!  │ Voice Query                         │
//!  ├─────────────────────────────────────┤
//!  │ You: How many employees are ...     │
//!  │                                     │
//!  │ Assistant: There are 42 employees.  │
//!  ├─────────────────────────────────────┤
//!  │ Status: Listening...                │
//!  └─────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use eframe::egui;

use crate::config::AppConfig;
use crate::pipeline::{UiEvent, UiEventSource, STATUS_INITIALIZING};

// ---------------------------------------------------------------------------
// AssistantApp
// ---------------------------------------------------------------------------

pub struct AssistantApp {
    events: UiEventSource,
    /// Transcript entries, oldest first.
    transcript: Vec<String>,
    status: String,
    last_poll: Option<Instant>,
    poll_interval: Duration,
    font_size: f32,
    title: String,
}

impl AssistantApp {
    pub fn new(events: UiEventSource, config: &AppConfig) -> Self {
        Self {
            events,
            transcript: Vec::new(),
            status: STATUS_INITIALIZING.to_string(),
            last_poll: None,
            poll_interval: config.turn.ui_poll_interval(),
            font_size: config.ui.font_size,
            title: config.ui.title.clone(),
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// The transcript as displayed: entries separated by a blank line.
    pub fn transcript_text(&self) -> String {
        self.transcript.join("\n\n")
    }

    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(line) => self.transcript.push(line),
            UiEvent::Status(text) => self.status = text,
        }
    }

    /// Drain pending events unless the last drain was less than one poll
    /// interval ago.  Returns how many events were applied.
    pub fn poll(&mut self, now: Instant) -> usize {
        if let Some(last) = self.last_poll {
            if now.duration_since(last) < self.poll_interval {
                return 0;
            }
        }
        self.last_poll = Some(now);

        let events = self.events.drain();
        let applied = events.len();
        for event in events {
            self.apply(event);
        }
        applied
    }

    // ── Drawing ──────────────────────────────────────────────────────────

    fn draw_transcript(&self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for (i, entry) in self.transcript.iter().enumerate() {
                    if i > 0 {
                        ui.add_space(self.font_size);
                    }
                    let color = if entry.starts_with("You:") {
                        egui::Color32::from_rgb(150, 200, 255)
                    } else {
                        egui::Color32::from_rgb(220, 220, 220)
                    };
                    ui.label(
                        egui::RichText::new(entry)
                            .size(self.font_size)
                            .color(color),
                    );
                }
            });
    }

    fn draw_status(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Status:").strong());
            ui.label(egui::RichText::new(&self.status).size(self.font_size));
        });
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for AssistantApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll(Instant::now());

        // Keep polling even when nothing else triggers a repaint.
        ctx.request_repaint_after(self.poll_interval);

        egui::TopBottomPanel::top("title").show(ctx, |ui| {
            ui.heading(&self.title);
        });
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.draw_status(ui);
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_transcript(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        log::info!("ui: window closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ui_channel, UiEventSink, STATUS_LISTENING, STATUS_QUERYING};

    fn app() -> (AssistantApp, UiEventSink) {
        let (sink, source) = ui_channel();
        (AssistantApp::new(source, &AppConfig::default()), sink)
    }

    #[test]
    fn starts_initializing_with_empty_transcript() {
        let (app, _sink) = app();
        assert_eq!(app.status(), STATUS_INITIALIZING);
        assert!(app.transcript().is_empty());
        assert_eq!(app.transcript_text(), "");
    }

    #[test]
    fn log_appends_and_status_replaces() {
        let (mut app, _sink) = app();
        app.apply(UiEvent::Log("You: list employees".into()));
        app.apply(UiEvent::Status(STATUS_QUERYING.into()));
        app.apply(UiEvent::Log("Assistant: Two rows.".into()));
        app.apply(UiEvent::Status(STATUS_LISTENING.into()));

        assert_eq!(app.status(), STATUS_LISTENING);
        assert_eq!(
            app.transcript_text(),
            "You: list employees\n\nAssistant: Two rows."
        );
    }

    #[test]
    fn poll_applies_events_in_order() {
        let (mut app, sink) = app();
        sink.status(STATUS_QUERYING);
        sink.log("You: a");
        sink.log("Assistant: b");
        sink.status(STATUS_LISTENING);

        assert_eq!(app.poll(Instant::now()), 4);
        assert_eq!(app.transcript(), ["You: a", "Assistant: b"]);
        assert_eq!(app.status(), STATUS_LISTENING);
    }

    #[test]
    fn poll_is_throttled_to_the_interval() {
        let (mut app, sink) = app();
        let start = Instant::now();
        assert_eq!(app.poll(start), 0);

        sink.log("You: early");
        assert_eq!(app.poll(start + Duration::from_millis(1)), 0);
        assert!(app.transcript().is_empty());

        let later = start + app.poll_interval;
        assert_eq!(app.poll(later), 1);
        assert_eq!(app.transcript(), ["You: early"]);
    }

    #[test]
    fn poll_survives_a_closed_sink() {
        let (mut app, sink) = app();
        sink.log("You: last words");
        drop(sink);
        assert_eq!(app.poll(Instant::now()), 1);
        assert_eq!(app.poll(Instant::now() + Duration::from_secs(1)), 0);
    }
}
