//! External model service abstractions.
//!
//! The pipeline depends on the [`Transcriber`], [`Summarizer`], and
//! [`Translator`] traits instead of concrete clients, which keeps request
//! handling decoupled from the services doing the heavy lifting. Handles
//! are constructed once at startup and shared read-only through `AppState`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, AsrBackendKind};
use crate::error::AppError;

pub mod http;
#[cfg(feature = "local-whisper")]
pub mod whisper_local;

/// Summary generation bounds (output tokens) passed to the summarizer.
pub const SUMMARY_MAX_TOKENS: u32 = 150;
pub const SUMMARY_MIN_TOKENS: u32 = 40;

/// Character cap applied to each text before a translation call.
pub const TRANSLATE_MAX_CHARS: usize = 4999;

/// Timestamped transcript chunk with its confidence signal.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    /// Segment start time in seconds.
    pub start_secs: f64,
    /// Segment end time in seconds.
    pub end_secs: f64,
    /// Text content for this segment.
    pub text: String,
    /// Average log-probability of the segment tokens, when the service
    /// reports one.
    pub avg_logprob: Option<f64>,
}

/// Full speech-to-text result returned by a transcription service.
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Concatenated transcript text.
    pub text: String,
    /// Detected language if available.
    pub language: Option<String>,
    /// Segment-level timing, text, and confidence details.
    pub segments: Vec<TranscriptSegment>,
}

/// Speech-to-text service contract.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes one uploaded file, blocking the request until done.
    async fn transcribe(
        &self,
        bytes: &[u8],
        extension: &str,
        filename: &str,
    ) -> Result<Transcription, AppError>;
}

/// Text summarization service contract.
///
/// Implementations generate at most [`SUMMARY_MAX_TOKENS`] and at least
/// [`SUMMARY_MIN_TOKENS`] output tokens, deterministically.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, AppError>;
}

/// Text translation service contract.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, AppError>;
}

/// Builds the configured transcription service handle.
pub fn build_transcriber(cfg: &AppConfig) -> Result<Arc<dyn Transcriber>, AppError> {
    match cfg.asr_backend {
        AsrBackendKind::Http => Ok(Arc::new(http::HttpTranscriber::new(cfg))),
        #[cfg(feature = "local-whisper")]
        AsrBackendKind::Local => Ok(Arc::new(whisper_local::LocalWhisperTranscriber::new(cfg)?)),
        #[cfg(not(feature = "local-whisper"))]
        AsrBackendKind::Local => Err(AppError::internal(
            "ASR_BACKEND=local requires building with the local-whisper feature",
        )),
    }
}

/// Builds the summarization service handle.
pub fn build_summarizer(cfg: &AppConfig) -> Arc<dyn Summarizer> {
    Arc::new(http::HttpSummarizer::new(cfg))
}

/// Builds the translation service handle.
pub fn build_translator(cfg: &AppConfig) -> Arc<dyn Translator> {
    Arc::new(http::HttpTranslator::new(cfg))
}

/// Truncates a string to at most `max_chars` characters without splitting
/// a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
