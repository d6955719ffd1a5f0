//! Sample-rate and channel conversion.
//!
//! Two directions use this module:
//!
//! * capture: device audio (any rate, any channel count) becomes the
//!   **16 kHz mono `f32`** stream the segmenter and Whisper expect;
//! * playback: a synthesized clip becomes mono at the output device's rate;
//!   the output callback writes each sample to every device channel.
//!
//! Resampling is linear interpolation; speech round-trips through it with no
//! audible artefacts at the rates involved here.

/// Rate the recognizer works at.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// Returns an empty vector for `channels == 0` and a copy for mono input.
///
/// ```rust
/// use voice_query::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Resample mono `samples` from `from_rate` to `to_rate` Hz.
///
/// Equal rates and empty input return a copy unchanged.  Output length is
/// `ceil(len * to_rate / from_rate)`.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = (src_pos as usize).min(last);
            let frac = (src_pos - idx as f64) as f32;
            match samples.get(idx + 1) {
                Some(&next) => samples[idx] * (1.0 - frac) + next * frac,
                None => samples[idx],
            }
        })
        .collect()
}

/// Convert one capture buffer into 16 kHz mono.
///
/// ```rust
/// use voice_query::audio::to_speech_format;
///
/// // 10 ms of 48 kHz stereo → 10 ms of 16 kHz mono
/// let chunk = vec![0.25_f32; 960];
/// let speech = to_speech_format(&chunk, 48_000, 2);
/// assert_eq!(speech.len(), 160);
/// ```
pub fn to_speech_format(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<f32> {
    let mono = downmix_to_mono(samples, channels);
    resample_linear(&mono, sample_rate, SPEECH_SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_two_channels_averages_frames() {
        let out = downmix_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels_is_empty() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_48k_to_16k_length() {
        let out = resample_linear(&vec![0.5_f32; 480], 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_24k_to_48k_doubles_length() {
        let out = resample_linear(&vec![0.0_f32; 240], 24_000, 48_000);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn resample_keeps_dc_level() {
        for s in resample_linear(&vec![0.5_f32; 441], 44_100, 16_000) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn same_rate_is_a_copy() {
        let input: Vec<f32> = (0..32).map(|i| i as f32).collect();
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn speech_format_from_mono_16k_is_unchanged() {
        let input = vec![0.1_f32; 160];
        assert_eq!(to_speech_format(&input, 16_000, 1), input);
    }
}
