//! Audio plumbing: continuous capture, segmentation and speaker output.
//!
//! # Capture path
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → to_speech_format
//!           → UtteranceSegmenter (VAD + PreRollBuffer) → utterance clips
//! ```
//!
//! # Output path
//!
//! ```text
//! tts_<uuid>.wav → AudioClip::from_wav → AudioSink::play(clip, StopSignal)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use voice_query::audio::{AudioCapture, AudioChunk, UtteranceSegmenter, to_speech_format};
//! use voice_query::config::AudioConfig;
//!
//! let (tx, rx) = mpsc::channel::<AudioChunk>();
//! let capture = AudioCapture::new(None).unwrap();
//! let _handle = capture.start(tx, |_| {}).unwrap();
//!
//! let mut segmenter = UtteranceSegmenter::from_audio_config(&AudioConfig::default());
//! while let Ok(chunk) = rx.recv() {
//!     let speech = to_speech_format(&chunk.samples, chunk.sample_rate, chunk.channels);
//!     for utterance in segmenter.push(&speech) {
//!         println!("utterance of {} samples", utterance.len());
//!     }
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod playback;
pub mod resample;
pub mod vad;

pub use buffer::PreRollBuffer;
pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use playback::{AudioClip, AudioSink, CpalSink, PlaybackError, PlaybackOutcome, StopSignal};
pub use resample::{
    downmix_to_mono, resample_linear, to_speech_format, SPEECH_SAMPLE_RATE,
};
pub use vad::{SegmenterConfig, UtteranceSegmenter, VadDetector, FRAME_SAMPLES};

#[cfg(test)]
pub use playback::MockSink;
