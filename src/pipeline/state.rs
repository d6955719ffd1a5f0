//! Turn state and the ignore-recognition window.
//!
//! [`TurnState`] is the coordinator's state machine, published through
//! [`SharedTurnState`] so the router and tests can observe it.
//! [`IgnoreRecognition`] is held during transitions in which every
//! recognized utterance must be discarded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// ```text
/// Listening ──content dequeued──▶ Processing ──answer──▶ Speaking
///     ▲                                                      │
///     └───────────── playback done · grace · drain · resume ─┘
/// Processing / Speaking ──fatal──▶ Error   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Listening,
    Processing,
    Speaking,
    Error,
}

impl TurnState {
    /// `true` while a turn owns the pipeline and playback.
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnState::Processing | TurnState::Speaking)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Listening => "Listening",
            TurnState::Processing => "Processing",
            TurnState::Speaking => "Speaking",
            TurnState::Error => "Error",
        }
    }
}

/// Cheap to clone.  `Error` is sticky: once entered no other state can be
/// set.
#[derive(Clone, Default)]
pub struct SharedTurnState {
    inner: Arc<Mutex<TurnState>>,
}

impl SharedTurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TurnState {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if the machine is already in `Error`.
    pub fn set(&self, next: TurnState) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == TurnState::Error {
            return false;
        }
        if *state != next {
            log::debug!("turn: {} → {}", state.label(), next.label());
        }
        *state = next;
        true
    }
}

// ---------------------------------------------------------------------------
// IgnoreRecognition
// ---------------------------------------------------------------------------

/// Counted flag: set while at least one [`IgnoreGuard`] is alive.  The
/// interruption pause and the end-of-turn grace period can overlap, so a
/// plain boolean would be cleared by whichever finished first.
#[derive(Clone, Default)]
pub struct IgnoreRecognition {
    holders: Arc<AtomicUsize>,
}

impl IgnoreRecognition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.holders.load(Ordering::SeqCst) > 0
    }

    pub fn hold(&self) -> IgnoreGuard {
        self.holders.fetch_add(1, Ordering::SeqCst);
        IgnoreGuard {
            holders: Arc::clone(&self.holders),
        }
    }
}

#[must_use = "recognition is only ignored while the guard is alive"]
pub struct IgnoreGuard {
    holders: Arc<AtomicUsize>,
}

impl Drop for IgnoreGuard {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_states() {
        assert!(!TurnState::Listening.is_busy());
        assert!(TurnState::Processing.is_busy());
        assert!(TurnState::Speaking.is_busy());
        assert!(!TurnState::Error.is_busy());
        assert_eq!(TurnState::default(), TurnState::Listening);
    }

    #[test]
    fn error_is_terminal() {
        let state = SharedTurnState::new();
        assert!(state.set(TurnState::Processing));
        assert!(state.set(TurnState::Error));
        assert!(!state.set(TurnState::Listening));
        assert_eq!(state.get(), TurnState::Error);
    }

    #[test]
    fn clones_share_state() {
        let state = SharedTurnState::new();
        let other = state.clone();
        state.set(TurnState::Speaking);
        assert_eq!(other.get(), TurnState::Speaking);
    }

    #[test]
    fn ignore_flag_follows_overlapping_guards() {
        let ignore = IgnoreRecognition::new();
        assert!(!ignore.is_set());

        let first = ignore.hold();
        let second = ignore.clone().hold();
        assert!(ignore.is_set());

        drop(first);
        assert!(ignore.is_set());
        drop(second);
        assert!(!ignore.is_set());
    }
}
