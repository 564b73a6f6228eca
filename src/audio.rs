//! Audio validation, decoding, and duration probing.
//!
//! Uploads are decoded with symphonia at their native sample rate for
//! acoustic analysis. Duration is read from container metadata where
//! possible so it never requires a full decode.

use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::error::AppError;

/// File extensions accepted by upload validation.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "mp4", "mov", "m4a"];

/// Decoded mono audio at its native sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Channel-averaged samples in `f32` range `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
}

/// Validates the file extension of an uploaded filename against the
/// allow-list.
///
/// Returns the lowercased extension without the leading dot.
pub fn validate_extension(filename: &str) -> Result<String, AppError> {
    if filename.trim().is_empty() {
        return Err(AppError::invalid_request("No selected file"));
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .ok_or_else(|| AppError::invalid_request("File type not allowed"))?;

    if !ALLOWED_EXTENSIONS.iter().any(|ext| *ext == extension) {
        return Err(AppError::invalid_request("File type not allowed"));
    }

    Ok(extension)
}

fn open_format(bytes: &[u8], extension_hint: &str) -> Result<Box<dyn FormatReader>, AppError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension_hint);

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AppError::internal(format!("failed to open media file: {err}")))?;

    Ok(probed.format)
}

/// Decodes media bytes into channel-averaged mono samples at the native
/// sample rate.
///
/// When `max_seconds` is set, decoding stops once that much audio has been
/// produced; the tail of the file is never touched.
pub fn decode_mono(
    bytes: &[u8],
    extension_hint: &str,
    max_seconds: Option<f64>,
) -> Result<DecodedAudio, AppError> {
    let mut format = open_format(bytes, extension_hint)?;
    let track = format
        .default_track()
        .ok_or_else(|| AppError::internal("no audio track found in uploaded file"))?;

    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err(AppError::internal(
            "unsupported codec: missing codec information",
        ));
    }

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| AppError::internal(format!("unsupported codec: {err}")))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let track_id = track.id;
    let mut mono = Vec::new();

    loop {
        if let Some(max_secs) = max_seconds {
            if sample_rate > 0 && mono.len() as f64 >= max_secs * f64::from(sample_rate) {
                break;
            }
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                return Err(AppError::internal(
                    "decoder reset required for this media stream",
                ));
            }
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed while reading media stream: {err}"
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed to decode audio packet: {err}"
                )));
            }
        };

        sample_rate = decoded.spec().rate;
        let channels = decoded.spec().channels.count();

        let mut sample_buffer =
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buffer.copy_interleaved_ref(decoded);
        let samples = sample_buffer.samples();

        if channels <= 1 {
            mono.extend(samples.iter().map(|s| s.clamp(-1.0, 1.0)));
            continue;
        }

        for frame in samples.chunks(channels) {
            let sum: f32 = frame.iter().sum();
            mono.push((sum / channels as f32).clamp(-1.0, 1.0));
        }
    }

    if mono.is_empty() || sample_rate == 0 {
        return Err(AppError::internal("decoded audio is empty after processing"));
    }

    if let Some(max_secs) = max_seconds {
        let max_samples = (max_secs * f64::from(sample_rate)) as usize;
        mono.truncate(max_samples.max(1));
    }

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
    })
}

/// Returns the full duration of a media file in seconds.
///
/// Uses the container's frame count when present, falling back to summing
/// packet durations. No sample decoding takes place.
pub fn probe_duration_secs(bytes: &[u8], extension_hint: &str) -> Result<f64, AppError> {
    let mut format = open_format(bytes, extension_hint)?;
    let track = format
        .default_track()
        .ok_or_else(|| AppError::internal("no audio track found in uploaded file"))?;

    let params = track.codec_params.clone();
    if let (Some(n_frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        if rate > 0 {
            return Ok(n_frames as f64 / f64::from(rate));
        }
    }

    let time_base = params.time_base.ok_or_else(|| {
        AppError::internal("media file carries neither frame count nor time base")
    })?;
    let track_id = track.id;

    let mut total_ts: u64 = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed while scanning media stream: {err}"
                )));
            }
        };
        if packet.track_id() == track_id {
            total_ts += packet.dur();
        }
    }

    let time = time_base.calc_time(total_ts);
    Ok(time.seconds as f64 + time.frac)
}

/// Decodes media bytes into 16 kHz mono samples for local whisper inference.
#[cfg(feature = "local-whisper")]
pub fn decode_to_mono_16khz_f32(bytes: &[u8], extension_hint: &str) -> Result<Vec<f32>, AppError> {
    const TARGET_SAMPLE_RATE: u32 = 16_000;

    let decoded = decode_mono(bytes, extension_hint, None)?;
    Ok(if decoded.sample_rate == TARGET_SAMPLE_RATE {
        decoded.samples
    } else {
        resample_linear(&decoded.samples, decoded.sample_rate, TARGET_SAMPLE_RATE)
    })
}

/// Resamples a mono signal from `src_rate` to `dst_rate` via linear
/// interpolation.
#[cfg(feature = "local-whisper")]
fn resample_linear(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || input.len() < 2 {
        return input.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = ((input.len() as f64) * (dst_rate as f64) / (src_rate as f64)).round() as usize;
    let out_len = out_len.max(1);

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}


#[cfg(test)]
mod tests {
    use super::test_support::sine_wav;
    use super::*;

    #[test]
    fn rejects_disallowed_extension() {
        assert!(validate_extension("clip.flac").is_err());
        assert!(validate_extension("noext").is_err());
        assert!(validate_extension("").is_err());
    }

    #[test]
    fn accepts_allow_list_case_insensitive() {
        assert_eq!(validate_extension("clip.MP3").unwrap(), "mp3");
        assert_eq!(validate_extension("movie.mov").unwrap(), "mov");
        assert_eq!(validate_extension("a.b.m4a").unwrap(), "m4a");
    }

    #[test]
    fn decodes_wav_at_native_rate() {
        let wav = sine_wav(1.0, 8000, 0.5);
        let decoded = decode_mono(&wav, "wav", None).unwrap();
        assert_eq!(decoded.sample_rate, 8000);
        assert!((decoded.samples.len() as i64 - 8000).unsigned_abs() < 16);
    }

    #[test]
    fn decode_cap_truncates_long_input() {
        let wav = sine_wav(2.0, 8000, 0.5);
        let decoded = decode_mono(&wav, "wav", Some(1.0)).unwrap();
        assert!(decoded.samples.len() <= 8000);
    }

    #[test]
    fn probe_duration_matches_wav_length() {
        let wav = sine_wav(2.0, 8000, 0.5);
        let duration = probe_duration_secs(&wav, "wav").unwrap();
        assert!((duration - 2.0).abs() < 0.05, "duration was {duration}");
    }

    #[test]
    fn probe_duration_rejects_garbage() {
        assert!(probe_duration_secs(&[0u8; 64], "wav").is_err());
    }
}
