//! Text-to-speech and the playback controller.
//!
//! ```text
//! PlaybackController::speak(text, lang)
//!     └─▶ tts-playback thread
//!           TempClip (tts_<uuid>.wav)
//!           SpeechSynthesizer::synthesize ─▶ AudioClip::from_wav ─▶ AudioSink::play
//!           drop clip · clear "speaking"
//! ```

pub mod clip;
pub mod controller;
pub mod synth;

pub use clip::{purge_stale_clips, TempClip, CLIP_PREFIX};
pub use controller::{PlaybackController, SpeakError};
pub use synth::{ApiSynthesizer, SpeechSynthesizer, TtsError};

#[cfg(test)]
pub use synth::MockSynthesizer;
