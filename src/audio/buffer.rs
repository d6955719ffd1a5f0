//! Bounded pre-roll buffer.
//!
//! While the segmenter waits for speech it keeps the most recent few hundred
//! milliseconds of audio here, so the first syllable of an utterance (which
//! is often quieter than the VAD threshold) is not clipped.  When capacity
//! is exceeded the oldest samples are discarded.
//!
//! ```rust
//! use voice_query::audio::PreRollBuffer;
//!
//! let mut buf = PreRollBuffer::new(4);
//! buf.extend_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(buf.take(), vec![2.0, 3.0, 4.0, 5.0]);
//! assert!(buf.is_empty());
//! ```

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct PreRollBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl PreRollBuffer {
    /// A buffer holding at most `capacity` samples.  A zero capacity keeps
    /// nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, evicting the oldest samples beyond capacity.
    pub fn extend_from_slice(&mut self, data: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        let tail = &data[data.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + tail.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(tail.iter().copied());
    }

    /// Remove and return everything in chronological order.
    pub fn take(&mut self) -> Vec<f32> {
        self.samples.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
