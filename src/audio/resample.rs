//! Resampling decoded audio to the 16 kHz rate the scoring backend expects.
//!
//! Output length is fixed by the source duration:
//!
//! ```text
//! target_len = floor(frames / source_rate × 16000)
//! ```
//!
//! and every [`ResampleMode`] honours it exactly, so switching modes never
//! changes the shape of the uploaded WAV, only its content.
//!
//! [`ResampleMode::Nearest`] is the drop-sample reference encoding the scoring
//! backend expects: output sample `i` is source sample
//! `floor(i × source_rate / 16000)`.  It aliases, which is acceptable for
//! speech scoring.  `Linear` and `Sinc` trade
//! CPU for fidelity.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

use crate::config::ResampleMode;

/// Output rate of every resampling mode.
pub const TARGET_RATE: u32 = 16_000;

/// Frames fed to the sinc resampler per call.
const SINC_CHUNK: usize = 1024;

// ---------------------------------------------------------------------------
// ResampleError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("invalid source sample rate: {0} Hz")]
    InvalidRate(u32),

    #[error("sinc resampler failed: {0}")]
    Sinc(String),
}

// ---------------------------------------------------------------------------
// target_length
// ---------------------------------------------------------------------------

/// Number of 16 kHz samples produced from `frames` source frames at
/// `source_rate` Hz.
///
/// Computed in integer arithmetic, so `floor(D × 16000)` is exact for every
/// duration `D = frames / source_rate`.
///
/// ```rust
/// use nihao_voice::audio::resample::target_length;
///
/// assert_eq!(target_length(96_000, 48_000), 32_000);
/// assert_eq!(target_length(44_100, 44_100), 16_000);
/// assert_eq!(target_length(2, 48_000), 0);
/// ```
pub fn target_length(frames: usize, source_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    (frames as u64 * TARGET_RATE as u64 / source_rate as u64) as usize
}

#[inline]
fn source_index(i: usize, source_rate: u32) -> usize {
    (i as u64 * source_rate as u64 / TARGET_RATE as u64) as usize
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` Hz to 16 kHz using `mode`.
///
/// # Errors
///
/// [`ResampleError::InvalidRate`] when `source_rate` is zero;
/// [`ResampleError::Sinc`] when `rubato` rejects the conversion.
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    mode: ResampleMode,
) -> Result<Vec<f32>, ResampleError> {
    if source_rate == 0 {
        return Err(ResampleError::InvalidRate(source_rate));
    }

    match mode {
        ResampleMode::Nearest => Ok(resample_nearest(samples, source_rate)),
        ResampleMode::Linear => Ok(resample_linear(samples, source_rate)),
        ResampleMode::Sinc => resample_sinc(samples, source_rate),
    }
}

/// Drop-sample resampling: output `i` takes source `floor(i × ratio)`.
///
/// Indices past the end of `samples` read as `0.0`; with the floor-based
/// output length this cannot happen for a consistent input.
pub fn resample_nearest(samples: &[f32], source_rate: u32) -> Vec<f32> {
    let out_len = target_length(samples.len(), source_rate);
    (0..out_len)
        .map(|i| {
            samples
                .get(source_index(i, source_rate))
                .copied()
                .unwrap_or(0.0)
        })
        .collect()
}

/// Linear interpolation between the two source samples around `i × ratio`.
pub fn resample_linear(samples: &[f32], source_rate: u32) -> Vec<f32> {
    let out_len = target_length(samples.len(), source_rate);
    let ratio = source_rate as f64 / TARGET_RATE as f64;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Band-limited resampling through `rubato`'s `SincFixedIn`.
///
/// The input is fed in fixed chunks (the final one padded with its last
/// sample), then the result is truncated or extended to the exact target
/// length.
pub fn resample_sinc(samples: &[f32], source_rate: u32) -> Result<Vec<f32>, ResampleError> {
    if source_rate == 0 {
        return Err(ResampleError::InvalidRate(source_rate));
    }

    let out_len = target_length(samples.len(), source_rate);
    if out_len == 0 {
        return Ok(Vec::new());
    }
    if source_rate == TARGET_RATE {
        return Ok(samples[..out_len].to_vec());
    }

    let ratio = TARGET_RATE as f64 / source_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.92,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut rs = SincFixedIn::<f32>::new(ratio, 2.0, params, SINC_CHUNK, 1)
        .map_err(|e| ResampleError::Sinc(e.to_string()))?;

    let mut out = Vec::with_capacity(out_len + SINC_CHUNK);
    let mut seg = vec![0.0_f32; SINC_CHUNK];
    for block in samples.chunks(SINC_CHUNK) {
        let pad = block.last().copied().unwrap_or(0.0);
        seg.fill(pad);
        seg[..block.len()].copy_from_slice(block);
        let produced = rs
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| ResampleError::Sinc(e.to_string()))?;
        out.extend_from_slice(&produced[0]);
    }

    let tail = out.last().copied().unwrap_or(0.0);
    out.resize(out_len, tail);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- target_length -----------------------------------------------------

    #[test]
    fn target_length_matches_floor_of_duration() {
        assert_eq!(target_length(96_000, 48_000), 32_000);
        assert_eq!(target_length(48_000, 48_000), 16_000);
        assert_eq!(target_length(22_050, 44_100), 8_000);
        // 1 frame @ 44.1 kHz = 0.3628 output samples → 0
        assert_eq!(target_length(1, 44_100), 0);
        // 100 frames @ 44.1 kHz = 36.28 → 36
        assert_eq!(target_length(100, 44_100), 36);
        // upsampling: 80 frames @ 8 kHz → 160
        assert_eq!(target_length(80, 8_000), 160);
    }

    #[test]
    fn target_length_zero_rate_is_zero() {
        assert_eq!(target_length(1_000, 0), 0);
    }

    // ---- nearest -----------------------------------------------------------

    #[test]
    fn nearest_48k_picks_every_third_sample() {
        let input: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let out = resample_nearest(&input, 48_000);
        assert_eq!(out, vec![0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn nearest_two_seconds_48k_gives_32000_samples() {
        let input = vec![0.2_f32; 96_000];
        let out = resample(&input, 48_000, ResampleMode::Nearest).unwrap();
        assert_eq!(out.len(), 32_000);
    }

    #[test]
    fn nearest_16k_is_identity() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        let out = resample_nearest(&input, 16_000);
        assert_eq!(out, input);
    }

    #[test]
    fn nearest_upsample_repeats_samples() {
        let input = vec![0.1_f32, 0.2, 0.3];
        let out = resample_nearest(&input, 8_000);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn nearest_44100_indices_stay_in_range() {
        let input: Vec<f32> = (0..44_100).map(|i| (i % 7) as f32).collect();
        let out = resample_nearest(&input, 44_100);
        assert_eq!(out.len(), 16_000);
        // Last output index maps to floor(15999 × 44100 / 16000) = 44097.
        assert_eq!(out[15_999], input[44_097]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        for mode in [ResampleMode::Nearest, ResampleMode::Linear, ResampleMode::Sinc] {
            let out = resample(&[], 48_000, mode).unwrap();
            assert!(out.is_empty(), "{mode:?}");
        }
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = resample(&[0.0; 10], 0, ResampleMode::Nearest).unwrap_err();
        assert!(matches!(err, ResampleError::InvalidRate(0)));
    }

    // ---- linear ------------------------------------------------------------

    #[test]
    fn linear_interpolates_between_neighbours() {
        // 32 kHz → 16 kHz: ratio 2, output i sits exactly on source 2i.
        let input = vec![0.0_f32, 1.0, 2.0, 3.0];
        let out = resample_linear(&input, 32_000);
        assert_eq!(out, vec![0.0, 2.0]);

        // 8 kHz → 16 kHz: ratio 0.5, odd outputs are midpoints.
        let out = resample_linear(&[0.0, 1.0], 8_000);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn linear_preserves_dc_level() {
        let input = vec![0.5_f32; 4_410];
        let out = resample_linear(&input, 44_100);
        assert_eq!(out.len(), 1_600);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-5));
    }

    // ---- sinc --------------------------------------------------------------

    #[test]
    fn sinc_output_length_is_exact() {
        for (frames, rate) in [(96_000usize, 48_000u32), (44_100, 44_100), (10_000, 22_050)] {
            let input = vec![0.0_f32; frames];
            let out = resample(&input, rate, ResampleMode::Sinc).unwrap();
            assert_eq!(out.len(), target_length(frames, rate), "{frames}@{rate}");
        }
    }

    #[test]
    fn sinc_keeps_low_frequency_tone_bounded() {
        let rate = 48_000u32;
        let input: Vec<f32> = (0..rate as usize)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        let out = resample_sinc(&input, rate).unwrap();
        assert_eq!(out.len(), 16_000);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.3 && peak < 0.7, "peak {peak}");
    }

    #[test]
    fn sinc_keeps_impulse_in_place() {
        let mut input = vec![0.0_f32; 48_000];
        input[24_000] = 1.0;
        let out = resample_sinc(&input, 48_000).unwrap();
        assert_eq!(out.len(), 16_000);

        let (peak_at, _) = out
            .iter()
            .enumerate()
            .fold((0, 0.0_f32), |(bi, bv), (i, &v)| {
                if v.abs() > bv {
                    (i, v.abs())
                } else {
                    (bi, bv)
                }
            });
        // 24 000 / 3 = 8 000, give or take a sample.
        assert!((7_998..=8_001).contains(&peak_at), "peak at {peak_at}");
    }
}
