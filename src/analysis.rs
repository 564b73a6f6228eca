//! Sonic DNA: derived acoustic metrics for an uploaded asset.
//!
//! Energy and clarity are computed from at most the first 60 seconds of
//! audio; pace uses the full-file duration so it reflects the whole
//! recording. Analysis never fails the pipeline: any decode or FFT error
//! degrades to a fixed fallback profile.

use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::{self, DecodedAudio};
use crate::error::AppError;

/// Seconds of audio decoded for energy/clarity analysis.
pub const ANALYSIS_WINDOW_SECS: f64 = 60.0;

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// The three derived acoustic scores for an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcousticProfile {
    /// RMS amplitude mapped to [10, 100].
    pub energy: i64,
    /// Words per minute over the full recording; 0 for empty audio.
    pub pace: i64,
    /// Mean spectral centroid mapped to [0, 100].
    pub clarity: i64,
}

/// Profile returned when the audio cannot be analyzed.
pub const FALLBACK_PROFILE: AcousticProfile = AcousticProfile {
    energy: 50,
    pace: 120,
    clarity: 70,
};

/// Computes the acoustic profile for an asset, falling back to
/// [`FALLBACK_PROFILE`] on any failure.
pub fn analyze(
    bytes: &[u8],
    extension: &str,
    transcript: &str,
    full_duration_secs: f64,
) -> AcousticProfile {
    match try_analyze(bytes, extension, transcript, full_duration_secs) {
        Ok(profile) => profile,
        Err(err) => {
            warn!(error = %err, "acoustic analysis failed; using fallback profile");
            FALLBACK_PROFILE
        }
    }
}

fn try_analyze(
    bytes: &[u8],
    extension: &str,
    transcript: &str,
    full_duration_secs: f64,
) -> Result<AcousticProfile, AppError> {
    let audio = audio::decode_mono(bytes, extension, Some(ANALYSIS_WINDOW_SECS))?;

    Ok(AcousticProfile {
        energy: energy_score(&audio.samples),
        pace: pace_score(transcript, full_duration_secs),
        clarity: clarity_score(&audio)?,
    })
}

/// RMS amplitude scaled by 1000, truncated, clamped to [10, 100].
///
/// The floor of 10 prevents a degenerate "zero energy" reading for quiet
/// but valid recordings.
pub fn energy_score(samples: &[f32]) -> i64 {
    if samples.is_empty() {
        return 10;
    }
    let sum_sq: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    ((rms * 1000.0) as i64).min(100).max(10)
}

/// Words per minute over the full recording duration; 0 when the duration
/// is zero or negative.
pub fn pace_score(transcript: &str, full_duration_secs: f64) -> i64 {
    if full_duration_secs <= 0.0 {
        return 0;
    }
    let word_count = transcript.split_whitespace().count();
    (word_count as f64 / (full_duration_secs / 60.0)) as i64
}

/// Mean frame-wise spectral centroid in Hz divided by 30, truncated,
/// bounded to [0, 100].
fn clarity_score(audio: &DecodedAudio) -> Result<i64, AppError> {
    let centroid = mean_spectral_centroid(&audio.samples, audio.sample_rate)?;
    Ok(((centroid / 30.0) as i64).min(100).max(0))
}

fn mean_spectral_centroid(samples: &[f32], sample_rate: u32) -> Result<f64, AppError> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let mut spectrum = fft.make_output_vec();

    let window: Vec<f32> = (0..FFT_SIZE)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / (FFT_SIZE - 1) as f64;
            (0.5 - 0.5 * phase.cos()) as f32
        })
        .collect();

    // A signal shorter than one window is zero-padded into a single frame.
    let padded;
    let signal = if samples.len() < FFT_SIZE {
        let mut buf = samples.to_vec();
        buf.resize(FFT_SIZE, 0.0);
        padded = buf;
        &padded[..]
    } else {
        samples
    };

    let hz_per_bin = f64::from(sample_rate) / FFT_SIZE as f64;
    let mut centroid_sum = 0.0;
    let mut frame_count = 0usize;

    for start in (0..=signal.len() - FFT_SIZE).step_by(HOP_SIZE) {
        let mut frame: Vec<f32> = signal[start..start + FFT_SIZE]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();

        fft.process(&mut frame, &mut spectrum)
            .map_err(|err| AppError::internal(format!("spectral analysis failed: {err}")))?;

        let mut weighted = 0.0;
        let mut total = 0.0;
        for (bin, value) in spectrum.iter().enumerate() {
            let magnitude = f64::from(value.norm());
            weighted += bin as f64 * hz_per_bin * magnitude;
            total += magnitude;
        }

        if total > 0.0 {
            centroid_sum += weighted / total;
            frame_count += 1;
        }
    }

    if frame_count == 0 {
        return Ok(0.0);
    }
    Ok(centroid_sum / frame_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::sine_wav;

    #[test]
    fn fallback_profile_on_undecodable_input() {
        let profile = analyze(&[0u8; 32], "wav", "some words here", 10.0);
        assert_eq!(profile, FALLBACK_PROFILE);
    }

    #[test]
    fn energy_is_clamped_to_range() {
        // Loud sine: rms ~0.35, *1000 far above the ceiling.
        let loud: Vec<f32> = (0..8000)
            .map(|i| (i as f32 * 0.3).sin() * 0.5)
            .collect();
        assert_eq!(energy_score(&loud), 100);

        // Silence floors at 10.
        assert_eq!(energy_score(&[0.0f32; 8000]), 10);
        assert_eq!(energy_score(&[]), 10);
    }

    #[test]
    fn pace_is_words_per_minute_of_full_duration() {
        assert_eq!(pace_score("a b c d", 120.0), 2);
        assert_eq!(pace_score("a b c d", 0.0), 0);
        assert_eq!(pace_score("a b c d", -1.0), 0);
        assert_eq!(pace_score("", 60.0), 0);
    }

    #[test]
    fn clarity_tracks_tone_frequency() {
        // A 440 Hz tone has its centroid near 440 Hz, so clarity ~ 440/30.
        let wav = sine_wav(1.0, 8000, 0.5);
        let decoded = crate::audio::decode_mono(&wav, "wav", None).unwrap();
        let clarity = clarity_score(&decoded).unwrap();
        assert!((0..=100).contains(&clarity));
        assert!((10..=20).contains(&clarity), "clarity was {clarity}");
    }

    #[test]
    fn analyzed_profile_respects_score_ranges() {
        let wav = sine_wav(2.0, 8000, 0.5);
        let profile = analyze(&wav, "wav", "four words spoken here", 2.0);
        assert!((10..=100).contains(&profile.energy));
        assert!((0..=100).contains(&profile.clarity));
        assert_eq!(profile.pace, 120);
    }
}
