//! The upload-processing pipeline.
//!
//! One atomic per-request workflow: validate the file, persist it,
//! transcribe, summarize (or synthesize a placeholder), compute the Sonic
//! DNA and duration, derive bullet points and keywords, append a history
//! record, and shape the response document. Re-running with the same
//! filename overwrites the stored asset and appends a new history entry.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::task;
use tracing::info;

use crate::analysis::{self, AcousticProfile};
use crate::audio;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::services::{truncate_chars, Summarizer, Transcriber, TranscriptSegment};

/// Transcripts at or below this word count get the placeholder summary.
pub const SUMMARY_TRIGGER_WORDS: usize = 50;
/// At most this many transcript characters are sent to the summarizer.
pub const SUMMARY_INPUT_CHARS: usize = 3000;
/// Summary used when the transcript is too short to summarize.
pub const SHORT_AUDIO_SUMMARY: &str = "Audio too short for AI summary.";
/// Confidence reported when no segment carries a log-probability.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

const MAX_BULLET_POINTS: usize = 3;
const MIN_BULLET_CHARS: usize = 10;
const MAX_KEYWORDS: usize = 5;
const MIN_KEYWORD_CHARS: usize = 5;

/// Response document returned by a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub transcript: String,
    pub summary: String,
    pub sonic_dna: AcousticProfile,
    pub audio_url: String,
    pub duration: f64,
    pub word_count: usize,
    pub bullet_points: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence_score: f64,
    pub filename: String,
}

/// Runs the full upload pipeline for one request.
pub async fn process_upload(
    cfg: &AppConfig,
    transcriber: &dyn Transcriber,
    summarizer: &dyn Summarizer,
    history: &HistoryStore,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<UploadResponse, AppError> {
    let filename = sanitize_filename(filename)?;
    let extension = audio::validate_extension(&filename)?;

    // Last write wins on filename collision.
    let asset_path = cfg.upload_dir.join(&filename);
    tokio::fs::write(&asset_path, &bytes)
        .await
        .map_err(|err| AppError::storage(format!("failed to store upload: {err}")))?;

    info!(filename = %filename, bytes = bytes.len(), "transcribing upload");
    let transcription = transcriber
        .transcribe(&bytes, &extension, &filename)
        .await?;
    let transcript = transcription.text;

    let confidence_score = confidence_score(&transcription.segments);
    let word_count = transcript.split_whitespace().count();

    let summary = if word_count > SUMMARY_TRIGGER_WORDS {
        summarizer
            .summarize(truncate_chars(&transcript, SUMMARY_INPUT_CHARS))
            .await?
    } else {
        SHORT_AUDIO_SUMMARY.to_string()
    };

    // Duration comes from a lightweight metadata read of the whole asset;
    // the analyzer separately decodes only its leading window.
    let analysis_bytes = Arc::new(bytes);
    let analysis_extension = extension.clone();
    let analysis_transcript = transcript.clone();
    let (duration, sonic_dna) = task::spawn_blocking(move || {
        let duration = audio::probe_duration_secs(&analysis_bytes, &analysis_extension)?;
        let profile = analysis::analyze(
            &analysis_bytes,
            &analysis_extension,
            &analysis_transcript,
            duration,
        );
        Ok::<_, AppError>((duration, profile))
    })
    .await
    .map_err(|err| AppError::internal(format!("audio analysis task failed: {err}")))??;

    let bullet_points = bullet_points(&summary);
    let keywords = extract_keywords(&transcript);
    let audio_url = format!("/uploads/{filename}");

    let record = HistoryRecord {
        id: chrono::Utc::now().timestamp(),
        filename: filename.clone(),
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        transcript: transcript.clone(),
        summary: summary.clone(),
        sonic_dna,
        bullet_points: bullet_points.clone(),
        keywords: keywords.clone(),
        confidence_score,
        word_count,
        audio_url: audio_url.clone(),
        duration,
    };
    history.prepend(record).await?;

    info!(
        filename = %filename,
        word_count,
        duration,
        confidence = confidence_score,
        "upload processed"
    );

    Ok(UploadResponse {
        transcript,
        summary,
        sonic_dna,
        audio_url,
        duration,
        word_count,
        bullet_points,
        keywords,
        confidence_score,
        filename,
    })
}

/// Reduces a declared filename to its final path component, rejecting
/// anything that would escape the upload directory.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_request("No selected file"));
    }

    let name = Path::new(trimmed)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AppError::invalid_request("Invalid filename"))?;

    if name != trimmed || name == ".." {
        return Err(AppError::invalid_request("Invalid filename"));
    }

    Ok(name.to_string())
}

/// Mean of exponentiated per-segment log-probabilities, with a fixed
/// fallback when no segment carries one.
pub fn confidence_score(segments: &[TranscriptSegment]) -> f64 {
    let probs: Vec<f64> = segments
        .iter()
        .filter_map(|seg| seg.avg_logprob)
        .map(f64::exp)
        .collect();

    if probs.is_empty() {
        return DEFAULT_CONFIDENCE;
    }
    probs.iter().sum::<f64>() / probs.len() as f64
}

/// Splits a summary into up to three bullet points on sentence periods,
/// dropping fragments of ten characters or fewer.
pub fn bullet_points(summary: &str) -> Vec<String> {
    summary
        .split('.')
        .map(str::trim)
        .filter(|piece| piece.chars().count() > MIN_BULLET_CHARS)
        .take(MAX_BULLET_POINTS)
        .map(ToOwned::to_owned)
        .collect()
}

/// Extracts the five most frequent long words from a transcript,
/// title-cased for display. Ties keep first-encounter order.
pub fn extract_keywords(transcript: &str) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();

    for raw in transcript.split_whitespace() {
        let token = raw
            .trim_matches(|c| matches!(c, '.' | ',' | '!' | '?'))
            .to_lowercase();
        if token.chars().count() <= MIN_KEYWORD_CHARS {
            continue;
        }
        match counts.iter_mut().find(|(word, _)| *word == token) {
            Some((_, count)) => *count += 1,
            None => counts.push((token, 1)),
        }
    }

    // Stable sort keeps encounter order among equal frequencies.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| title_case(&word))
        .collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(avg_logprob: Option<f64>) -> TranscriptSegment {
        TranscriptSegment {
            start_secs: 0.0,
            end_secs: 1.0,
            text: "hello".to_string(),
            avg_logprob,
        }
    }

    #[test]
    fn confidence_is_mean_of_exp_logprobs() {
        let segments = vec![segment(Some(0.0)), segment(Some(-1.0))];
        let expected = (1.0 + (-1.0f64).exp()) / 2.0;
        assert!((confidence_score(&segments) - expected).abs() < 1e-12);
    }

    #[test]
    fn confidence_defaults_without_logprobs() {
        assert_eq!(confidence_score(&[]), DEFAULT_CONFIDENCE);
        assert_eq!(confidence_score(&[segment(None)]), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn bullet_points_keep_long_sentences_up_to_three() {
        let summary = "First point made here. Too short. Second lengthy observation. \
                       Third interesting takeaway. Fourth one never shows.";
        let bullets = bullet_points(summary);
        assert_eq!(
            bullets,
            vec![
                "First point made here",
                "Second lengthy observation",
                "Third interesting takeaway",
            ]
        );
    }

    #[test]
    fn bullet_points_measure_length_in_chars() {
        // Seven chars but fourteen bytes; must still be dropped as short.
        let summary = "ééééééé. Première observation détaillée ici.";
        assert_eq!(bullet_points(summary), vec!["Première observation détaillée ici"]);
    }

    #[test]
    fn bullet_points_of_placeholder_summary() {
        assert_eq!(bullet_points(SHORT_AUDIO_SUMMARY), vec![
            "Audio too short for AI summary"
        ]);
    }

    #[test]
    fn keywords_rank_by_frequency_then_encounter_order() {
        let transcript = "testing testing banana banana banana apple";
        assert_eq!(extract_keywords(transcript), vec!["Banana", "Testing"]);
    }

    #[test]
    fn keywords_strip_punctuation_and_lowercase() {
        let transcript = "Planning, planning! planning? budget budget. tiny";
        assert_eq!(extract_keywords(transcript), vec!["Planning", "Budget"]);
    }

    #[test]
    fn keywords_cap_at_five() {
        let transcript =
            "alphas alphas bravos bravos charlies charlies deltas deltas echoes echoes foxtrots";
        let keywords = extract_keywords(transcript);
        assert_eq!(keywords.len(), 5);
        assert!(!keywords.contains(&"Foxtrots".to_string()));
    }

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("a/b.wav").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("").is_err());
        assert_eq!(sanitize_filename("talk.wav").unwrap(), "talk.wav");
    }
}
