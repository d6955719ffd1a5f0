//! Content queue with epoch-based draining.
//!
//! Every item is tagged with the epoch current when it was sent.  Ending a
//! turn advances the epoch; items from an older epoch are discarded when
//! they reach the front instead of being removed from under the producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

struct Tagged {
    epoch: u64,
    text: String,
}

/// Producer side; cheap to clone.
#[derive(Clone)]
pub struct ContentSender {
    tx: mpsc::Sender<Tagged>,
    epoch: Arc<AtomicU64>,
}

/// Single consumer, owned by the coordinator.
pub struct ContentReceiver {
    rx: mpsc::Receiver<Tagged>,
    epoch: Arc<AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Item(String),
    Timeout,
    /// Every sender is gone.
    Closed,
}

pub fn content_queue() -> (ContentSender, ContentReceiver) {
    let (tx, rx) = mpsc::channel();
    let epoch = Arc::new(AtomicU64::new(0));
    (
        ContentSender {
            tx,
            epoch: Arc::clone(&epoch),
        },
        ContentReceiver { rx, epoch },
    )
}

impl ContentSender {
    /// Returns `false` once the receiver is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        let item = Tagged {
            epoch: self.epoch.load(Ordering::SeqCst),
            text: text.into(),
        };
        self.tx.send(item).is_ok()
    }
}

impl ContentReceiver {
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Discard everything sent so far.
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Next current-epoch item, waiting at most `timeout` per item read.
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        loop {
            match self.rx.recv_timeout(timeout) {
                Ok(item) if item.epoch == self.epoch() => return Received::Item(item.text),
                Ok(stale) => log::debug!("turn: dropping stale input {:?}", stale.text),
                Err(RecvTimeoutError::Timeout) => return Received::Timeout,
                Err(RecvTimeoutError::Disconnected) => return Received::Closed,
            }
        }
    }
}
