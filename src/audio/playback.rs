//! Speaker output for synthesized answers.
//!
//! ```text
//!   AudioClip::from_wav ──▶ AudioSink::play(clip, stop) ──▶ PlaybackOutcome
//!                                   │
//!                           cpal output callback
//!                       (silence once `stop` fires)
//! ```
//!
//! [`AudioSink::play`] blocks the calling thread until the clip has been
//! played or the [`StopSignal`] fires, whichever comes first.  The stop is
//! observed inside the device callback as well as by the waiting thread, so
//! output goes silent within one device buffer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::resample::{downmix_to_mono, resample_linear};

/// How often the waiting thread checks for completion or a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Slack added to the clip length before playback is abandoned.
const DRAIN_SLACK: Duration = Duration::from_millis(500);
/// Time the stream stays open after the callback ran out of samples, so the
/// device plays the last buffer it was handed.
const TAIL_FLUSH: Duration = Duration::from_millis(60);

// ---------------------------------------------------------------------------
// StopSignal
// ---------------------------------------------------------------------------

/// One-shot cancellation flag shared between the controller and a sink.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// Decoded audio ready for output.  Samples are interleaved `f32`.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    /// Decode a WAV file (integer or float PCM).
    pub fn from_wav(path: &Path) -> Result<Self, PlaybackError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }

    /// Mono copy at `rate` Hz.
    pub fn to_mono_at(&self, rate: u32) -> Vec<f32> {
        let mono = downmix_to_mono(&self.samples, self.channels);
        resample_linear(&mono, self.sample_rate, rate)
    }
}

// ---------------------------------------------------------------------------
// PlaybackOutcome / PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The whole clip was played.
    Completed,
    /// The stop signal fired first.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("output device {0:?} not found")]
    DeviceNotFound(String),

    #[error("output device error: {0}")]
    Device(String),

    #[error("failed to decode WAV: {0}")]
    Wav(#[from] hound::Error),
}

// ---------------------------------------------------------------------------
// AudioSink
// ---------------------------------------------------------------------------

/// Blocking audio output.
pub trait AudioSink: Send + Sync {
    /// Play `clip` to completion or until `stop` fires.
    fn play(&self, clip: &AudioClip, stop: &StopSignal) -> Result<PlaybackOutcome, PlaybackError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioSink>) {}
};

// ---------------------------------------------------------------------------
// CpalSink
// ---------------------------------------------------------------------------

/// Plays through a cpal output device.  The device is opened per clip so a
/// headset plugged in mid-session is picked up on the next answer.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    device_name: Option<String>,
}

impl CpalSink {
    /// `None` selects the system default output.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn open_device(&self) -> Result<cpal::Device, PlaybackError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| PlaybackError::Device(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| PlaybackError::DeviceNotFound(name.clone())),
            None => host.default_output_device().ok_or(PlaybackError::NoDevice),
        }
    }
}

impl AudioSink for CpalSink {
    fn play(&self, clip: &AudioClip, stop: &StopSignal) -> Result<PlaybackOutcome, PlaybackError> {
        if clip.is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }
        if stop.is_triggered() {
            return Ok(PlaybackOutcome::Cancelled);
        }

        let device = self.open_device()?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?
            .into();
        let channels = config.channels.max(1) as usize;
        let rate = config.sample_rate.0;

        let samples = Arc::new(clip.to_mono_at(rate));
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            let stop = stop.clone();
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let halted = stop.is_triggered();
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = match samples.get(pos) {
                                Some(&s) if !halted => {
                                    pos += 1;
                                    s
                                }
                                _ => {
                                    finished.store(true, Ordering::SeqCst);
                                    0.0
                                }
                            };
                            frame.fill(sample);
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| log::error!("playback: stream error: {err}"),
                    None,
                )
                .map_err(|e| PlaybackError::Device(e.to_string()))?
        };
        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let deadline = Instant::now() + clip.duration() + DRAIN_SLACK;
        let outcome = await_drain(stop, &finished, deadline);

        drop(stream);
        log::debug!(
            "playback: {:?} after {} of {} samples",
            outcome,
            position.load(Ordering::Relaxed),
            samples.len()
        );
        Ok(outcome)
    }
}

/// Block until the output callback has run dry (plus [`TAIL_FLUSH`]), `stop`
/// fires, or `deadline` passes.
fn await_drain(stop: &StopSignal, finished: &AtomicBool, deadline: Instant) -> PlaybackOutcome {
    loop {
        if stop.is_triggered() {
            return PlaybackOutcome::Cancelled;
        }
        if finished.load(Ordering::SeqCst) {
            break;
        }
        if Instant::now() >= deadline {
            log::warn!("playback: device did not drain in time; giving up");
            return PlaybackOutcome::Completed;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let flushed = Instant::now() + TAIL_FLUSH;
    while Instant::now() < flushed {
        if stop.is_triggered() {
            return PlaybackOutcome::Cancelled;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    PlaybackOutcome::Completed
}

// ---------------------------------------------------------------------------
// MockSink (test only)
// ---------------------------------------------------------------------------

/// Test sink that "plays" for a fixed wall-clock time while honouring stop.
#[cfg(test)]
pub struct MockSink {
    play_time: Duration,
    plays: AtomicUsize,
}

#[cfg(test)]
impl MockSink {
    pub fn new(play_time: Duration) -> Self {
        Self {
            play_time,
            plays: AtomicUsize::new(0),
        }
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl AudioSink for MockSink {
    fn play(&self, _clip: &AudioClip, stop: &StopSignal) -> Result<PlaybackOutcome, PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + self.play_time;
        while Instant::now() < deadline {
            if stop.is_triggered() {
                return Ok(PlaybackOutcome::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(PlaybackOutcome::Completed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as usize {
            writer.write_sample(i16::MAX / 2).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let a = StopSignal::new();
        let b = a.clone();
        assert!(!b.is_triggered());
        a.trigger();
        assert!(b.is_triggered());
    }

    #[test]
    fn decodes_integer_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, 24_000, 2, 2_400);

        let clip = AudioClip::from_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.samples.len(), 4_800);
        assert!((clip.samples[0] - 0.5).abs() < 1e-3);
        assert_eq!(clip.duration(), Duration::from_millis(100));
    }

    #[test]
    fn missing_file_is_a_wav_error() {
        let err = AudioClip::from_wav(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, PlaybackError::Wav(_)));
    }

    #[test]
    fn mono_conversion_matches_output_rate() {
        let clip = AudioClip {
            samples: vec![0.2; 480],
            sample_rate: 24_000,
            channels: 2,
        };
        assert_eq!(clip.to_mono_at(48_000).len(), 480);
    }

    #[test]
    fn mock_sink_completes_or_cancels() {
        let sink = MockSink::new(Duration::from_millis(20));
        let clip = AudioClip {
            samples: vec![0.0; 10],
            sample_rate: 16_000,
            channels: 1,
        };

        let stop = StopSignal::new();
        assert_eq!(sink.play(&clip, &stop).unwrap(), PlaybackOutcome::Completed);

        stop.trigger();
        assert_eq!(sink.play(&clip, &stop).unwrap(), PlaybackOutcome::Cancelled);
        assert_eq!(sink.plays(), 2);
    }

    #[test]
    fn cpal_sink_skips_empty_clips() {
        let clip = AudioClip {
            samples: Vec::new(),
            sample_rate: 24_000,
            channels: 1,
        };
        let outcome = CpalSink::new(None).play(&clip, &StopSignal::new()).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
    }

    #[test]
    fn drained_stream_stays_open_for_the_tail() {
        let finished = AtomicBool::new(true);
        let started = Instant::now();
        let outcome = await_drain(
            &StopSignal::new(),
            &finished,
            Instant::now() + Duration::from_secs(5),
        );
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(started.elapsed() >= TAIL_FLUSH);
    }

    #[test]
    fn stop_during_the_tail_cancels() {
        let finished = AtomicBool::new(true);
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            trigger.trigger();
        });
        let outcome = await_drain(&stop, &finished, Instant::now() + Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(outcome, PlaybackOutcome::Cancelled);
    }

    #[test]
    fn undrained_stream_gives_up_at_the_deadline() {
        let finished = AtomicBool::new(false);
        let outcome = await_drain(&StopSignal::new(), &finished, Instant::now());
        assert_eq!(outcome, PlaybackOutcome::Completed);

        let stop = StopSignal::new();
        stop.trigger();
        let outcome = await_drain(&stop, &finished, Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, PlaybackOutcome::Cancelled);
    }
}
