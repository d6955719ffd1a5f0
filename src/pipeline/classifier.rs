//! Sorting recognized text into interruptions, content and noise.

/// Phrases that cut playback short, compared after [`normalize`].
pub const INTERRUPTION_PHRASES: [&str; 4] = ["stop", "hold on", "wait", "shut up"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Stop playback now.
    Interruption,
    /// A question for the pipeline, as recognized.
    Content(String),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Inside an ignore-recognition window.
    Ignoring,
    /// Heard while the assistant itself was talking.
    SelfEcho,
    /// An interruption phrase with nothing to interrupt.
    InterruptionWhileIdle,
    /// Nothing left after normalisation.
    Empty,
    /// The coordinator has stopped; nothing will consume the input.
    Halted,
}

/// Lowercase, drop punctuation, collapse whitespace.
///
/// ```
/// use voice_query::pipeline::classifier::normalize;
///
/// assert_eq!(normalize("  Hold on! "), "hold on");
/// ```
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !matches!(c, '¡' | '¿' | '…' | '’' | '‘' | '“' | '”'))
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_interruption(normalized: &str) -> bool {
    INTERRUPTION_PHRASES.contains(&normalized)
}

/// Classify one utterance given the current speaking and ignore flags.
pub fn classify(text: &str, speaking: bool, ignoring: bool) -> Classification {
    if ignoring {
        return Classification::Dropped(DropReason::Ignoring);
    }

    let normalized = normalize(text);
    if is_interruption(&normalized) {
        return if speaking {
            Classification::Interruption
        } else {
            Classification::Dropped(DropReason::InterruptionWhileIdle)
        };
    }

    if speaking {
        return Classification::Dropped(DropReason::SelfEcho);
    }
    if normalized.is_empty() {
        return Classification::Dropped(DropReason::Empty);
    }
    Classification::Content(text.trim().to_string())
}
