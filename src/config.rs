//! Configuration loading from environment variables.
//!
//! Values are intentionally validated early so startup fails fast with
//! actionable errors.

use std::env;
use std::path::PathBuf;

use crate::error::AppError;

pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;
pub const MAX_UPLOAD_MB_CEILING: usize = 4096;

/// Supported transcription backend implementations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AsrBackendKind {
    /// Posts audio to an OpenAI-compatible transcription endpoint.
    Http,
    /// Runs whisper.cpp in-process (requires the `local-whisper` feature).
    Local,
}

/// Runtime configuration for the HTTP server, storage paths, and the
/// external transcription/summarization/translation services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Directory holding uploaded binaries, keyed by filename.
    pub upload_dir: PathBuf,
    /// Path of the JSON history store file.
    pub history_file: PathBuf,
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: usize,
    /// Selected transcription backend.
    pub asr_backend: AsrBackendKind,
    /// OpenAI-compatible transcription endpoint URL.
    pub asr_endpoint: String,
    /// Optional bearer token for the transcription endpoint.
    pub asr_api_key: Option<String>,
    /// Model identifier sent to the transcription endpoint.
    pub asr_model: String,
    /// Local whisper model path (used by the `local-whisper` backend).
    pub whisper_model: String,
    /// Summarization endpoint URL (Hugging Face inference API shape).
    pub summarizer_endpoint: String,
    /// Optional bearer token for the summarization endpoint.
    pub summarizer_api_key: Option<String>,
    /// Translation endpoint URL (LibreTranslate shape).
    pub translate_endpoint: String,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `5001`)
    /// - `UPLOAD_DIR` (default `uploads`)
    /// - `HISTORY_FILE` (default `history.json`)
    /// - `MAX_UPLOAD_MB` (default `200`, min `1`, max `4096`)
    /// - `ASR_BACKEND` (`http` or `local`, default `http`)
    /// - `ASR_ENDPOINT` (default `http://127.0.0.1:8000/v1/audio/transcriptions`)
    /// - `ASR_API_KEY` (optional)
    /// - `ASR_MODEL` (default `whisper-1`)
    /// - `WHISPER_MODEL` (local model path, default under `$HOME/.cache`)
    /// - `SUMMARIZER_ENDPOINT` (default the hosted `facebook/bart-large-cnn`)
    /// - `SUMMARIZER_API_KEY` (optional)
    /// - `TRANSLATE_ENDPOINT` (default `http://127.0.0.1:5000/translate`)
    pub fn from_env() -> Result<Self, AppError> {
        let host = env_str("HOST", "127.0.0.1");
        let port = env_u16("PORT", 5001)?;
        let upload_dir = PathBuf::from(env_str("UPLOAD_DIR", "uploads"));
        let history_file = PathBuf::from(env_str("HISTORY_FILE", "history.json"));
        let max_upload_mb = env_usize_bounded(
            "MAX_UPLOAD_MB",
            DEFAULT_MAX_UPLOAD_MB,
            1,
            MAX_UPLOAD_MB_CEILING,
        )?;

        let asr_backend = match env_str("ASR_BACKEND", "http").as_str() {
            "http" => AsrBackendKind::Http,
            "local" => AsrBackendKind::Local,
            other => {
                return Err(AppError::internal(format!(
                    "invalid ASR_BACKEND={other:?}; expected http or local"
                )));
            }
        };

        Ok(Self {
            host,
            port,
            upload_dir,
            history_file,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            asr_backend,
            asr_endpoint: env_str(
                "ASR_ENDPOINT",
                "http://127.0.0.1:8000/v1/audio/transcriptions",
            ),
            asr_api_key: env_opt("ASR_API_KEY"),
            asr_model: env_str("ASR_MODEL", "whisper-1"),
            whisper_model: env_str("WHISPER_MODEL", &default_whisper_model_path()),
            summarizer_endpoint: env_str(
                "SUMMARIZER_ENDPOINT",
                "https://api-inference.huggingface.co/models/facebook/bart-large-cnn",
            ),
            summarizer_api_key: env_opt("SUMMARIZER_API_KEY"),
            translate_endpoint: env_str("TRANSLATE_ENDPOINT", "http://127.0.0.1:5000/translate"),
        })
    }
}

fn default_whisper_model_path() -> String {
    format!(
        "{}/.cache/whispercpp/models/ggml-base.bin",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}
