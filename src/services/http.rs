//! HTTP client implementations of the service traits.
//!
//! Transcription speaks the OpenAI-compatible multipart API with
//! `response_format=verbose_json`, summarization the Hugging Face
//! inference API shape, and translation the LibreTranslate shape. Every
//! call is attempted exactly once; failures surface the upstream message.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::error::AppError;

use super::{
    truncate_chars, Summarizer, Transcriber, Transcription, TranscriptSegment, Translator,
    SUMMARY_MAX_TOKENS, SUMMARY_MIN_TOKENS, TRANSLATE_MAX_CHARS,
};

/// Transcription client for an OpenAI-compatible `/v1/audio/transcriptions`
/// endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTranscriber {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.asr_endpoint.clone(),
            api_key: cfg.asr_api_key.clone(),
            model: cfg.asr_model.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        bytes: &[u8],
        _extension: &str,
        filename: &str,
    ) -> Result<Transcription, AppError> {
        let file_part = Part::bytes(bytes.to_vec()).file_name(filename.to_owned());
        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::service(format!("transcription request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::service(format!(
                "transcription service returned {status}: {body}"
            )));
        }

        let parsed: VerboseTranscription = response
            .json()
            .await
            .map_err(|err| AppError::service(format!("invalid transcription response: {err}")))?;

        Ok(Transcription {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
            segments: parsed
                .segments
                .into_iter()
                .map(|seg| TranscriptSegment {
                    start_secs: seg.start,
                    end_secs: seg.end,
                    text: seg.text.trim().to_string(),
                    avg_logprob: seg.avg_logprob,
                })
                .collect(),
        })
    }
}

/// Summarization client for a Hugging Face inference-API-shaped endpoint.
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSummarizer {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.summarizer_endpoint.clone(),
            api_key: cfg.summarizer_api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryItem {
    summary_text: String,
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, AppError> {
        let body = json!({
            "inputs": text,
            "parameters": {
                "max_length": SUMMARY_MAX_TOKENS,
                "min_length": SUMMARY_MIN_TOKENS,
                "do_sample": false,
            },
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::service(format!("summarization request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::service(format!(
                "summarization service returned {status}: {body}"
            )));
        }

        let items: Vec<SummaryItem> = response
            .json()
            .await
            .map_err(|err| AppError::service(format!("invalid summarization response: {err}")))?;

        items
            .into_iter()
            .next()
            .map(|item| item.summary_text)
            .ok_or_else(|| AppError::service("summarization service returned no candidates"))
    }
}

/// Translation client for a LibreTranslate-shaped endpoint.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.translate_endpoint.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranslateReply {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, AppError> {
        if text.is_empty() {
            return Ok(String::new());
        }

        // Upstream services reject oversized inputs; cap before the call.
        let body = json!({
            "q": truncate_chars(text, TRANSLATE_MAX_CHARS),
            "source": "auto",
            "target": target_lang,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::service(format!("translation request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::service(format!(
                "translation service returned {status}: {body}"
            )));
        }

        let reply: TranslateReply = response
            .json()
            .await
            .map_err(|err| AppError::service(format!("invalid translation response: {err}")))?;

        Ok(reply.translated_text)
    }
}
