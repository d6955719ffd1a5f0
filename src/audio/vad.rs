//! Energy-based voice activity detection and utterance segmentation.
//!
//! [`VadDetector`] classifies 30 ms frames (480 samples @ 16 kHz) as voice
//! when their RMS amplitude exceeds a threshold.
//!
//! [`UtteranceSegmenter`] turns the continuous 16 kHz microphone stream into
//! discrete utterances for the recognizer:
//!
//! ```text
//!   silence ──voiced frame──▶ in speech ──hang-over of silent frames──▶ emit
//!      ▲  (pre-roll kept)         │                                      │
//!      │                          └──── max length reached ─────────────▶┤
//!      └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Segments with fewer voiced frames than the configured minimum (coughs,
//! clicks) are discarded instead of emitted.

use crate::audio::buffer::PreRollBuffer;
use crate::audio::resample::SPEECH_SAMPLE_RATE;
use crate::config::AudioConfig;

/// 30 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 480;

// ---------------------------------------------------------------------------
// VadDetector
// ---------------------------------------------------------------------------

/// Frame classifier and silence trimmer.
///
/// ```rust
/// use voice_query::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
///
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// ```
#[derive(Debug, Clone)]
pub struct VadDetector {
    rms_threshold: f32,
    frame_size: usize,
}

impl VadDetector {
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: FRAME_SAMPLES,
        }
    }

    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn with_frame_size(rms_threshold: f32, frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// `true` when the RMS of `frame` is above the threshold.
    pub fn is_voice(&self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }

    /// Trim leading and trailing silent frames.  Returns a sub-slice; an
    /// all-silent input yields an empty slice.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        let frames: Vec<&[f32]> = audio.chunks(self.frame_size).collect();

        let Some(first) = frames.iter().position(|f| self.is_voice(f)) else {
            return &audio[0..0];
        };
        let last = frames
            .iter()
            .rposition(|f| self.is_voice(f))
            .unwrap_or(first);

        let start = first * self.frame_size;
        let end = ((last + 1) * self.frame_size).min(audio.len());
        &audio[start..end]
    }
}

// ---------------------------------------------------------------------------
// SegmenterConfig
// ---------------------------------------------------------------------------

/// Frame-count limits for [`UtteranceSegmenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub pre_roll_frames: usize,
    pub hangover_frames: usize,
    pub min_speech_frames: usize,
    pub max_frames: usize,
}

impl SegmenterConfig {
    /// Convert the millisecond settings of [`AudioConfig`] to 30 ms frames.
    pub fn from_audio_config(audio: &AudioConfig) -> Self {
        let frames = |ms: u64| -> usize {
            let samples = ms as usize * SPEECH_SAMPLE_RATE as usize / 1_000;
            samples.div_ceil(FRAME_SAMPLES)
        };
        let max_ms = (audio.max_utterance_secs.max(0.0) * 1_000.0) as u64;

        Self {
            pre_roll_frames: frames(audio.pre_roll_ms),
            hangover_frames: frames(audio.silence_hangover_ms).max(1),
            min_speech_frames: frames(audio.min_speech_ms).max(1),
            max_frames: frames(max_ms).max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// UtteranceSegmenter
// ---------------------------------------------------------------------------

/// Streaming splitter from continuous 16 kHz audio to utterance clips.
pub struct UtteranceSegmenter {
    vad: VadDetector,
    limits: SegmenterConfig,
    pending: Vec<f32>,
    pre_roll: PreRollBuffer,
    current: Vec<f32>,
    in_speech: bool,
    voiced_frames: usize,
    silent_run: usize,
}

impl UtteranceSegmenter {
    pub fn new(vad: VadDetector, limits: SegmenterConfig) -> Self {
        let pre_roll = PreRollBuffer::new(limits.pre_roll_frames * vad.frame_size());
        Self {
            vad,
            limits,
            pending: Vec::new(),
            pre_roll,
            current: Vec::new(),
            in_speech: false,
            voiced_frames: 0,
            silent_run: 0,
        }
    }

    pub fn from_audio_config(audio: &AudioConfig) -> Self {
        Self::new(
            VadDetector::new(audio.vad_threshold),
            SegmenterConfig::from_audio_config(audio),
        )
    }

    /// Feed 16 kHz mono samples; returns every utterance completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let frame_size = self.vad.frame_size();
        self.pending.extend_from_slice(samples);

        let mut finished = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= frame_size {
            let frame: Vec<f32> = self.pending[offset..offset + frame_size].to_vec();
            offset += frame_size;
            if let Some(utterance) = self.process_frame(&frame) {
                finished.push(utterance);
            }
        }
        self.pending.drain(..offset);
        finished
    }

    /// Forget any partial utterance and buffered audio.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pre_roll.clear();
        self.current.clear();
        self.in_speech = false;
        self.voiced_frames = 0;
        self.silent_run = 0;
    }

    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    fn process_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let voiced = self.vad.is_voice(frame);

        if !self.in_speech {
            if voiced {
                self.in_speech = true;
                self.current = self.pre_roll.take();
                self.current.extend_from_slice(frame);
                self.voiced_frames = 1;
                self.silent_run = 0;
            } else {
                self.pre_roll.extend_from_slice(frame);
            }
            return None;
        }

        self.current.extend_from_slice(frame);
        if voiced {
            self.voiced_frames += 1;
            self.silent_run = 0;
        } else {
            self.silent_run += 1;
        }

        let too_long = self.current.len() >= self.limits.max_frames * self.vad.frame_size();
        if self.silent_run >= self.limits.hangover_frames || too_long {
            return self.finish();
        }
        None
    }

    fn finish(&mut self) -> Option<Vec<f32>> {
        let audio = std::mem::take(&mut self.current);
        let keep = self.voiced_frames >= self.limits.min_speech_frames;
        self.in_speech = false;
        self.voiced_frames = 0;
        self.silent_run = 0;
        keep.then_some(audio)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
