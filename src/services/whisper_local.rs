//! In-process whisper.cpp transcription via `whisper-rs`.
//!
//! Enabled with the `local-whisper` cargo feature. whisper.cpp does not
//! report OpenAI-style per-segment average log-probabilities, so segments
//! carry no confidence signal and the pipeline falls back to its fixed
//! confidence constant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task;
use whisper_rs::{
    get_lang_str, FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
};

use crate::audio::decode_to_mono_16khz_f32;
use crate::config::AppConfig;
use crate::error::AppError;

use super::{Transcriber, Transcription, TranscriptSegment};

/// Local inference backend powered by `whisper-rs`.
pub struct LocalWhisperTranscriber {
    model_path: String,
    context: Arc<Mutex<WhisperContext>>,
}

impl LocalWhisperTranscriber {
    /// Loads the configured whisper model once, at startup.
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let model_path = cfg.whisper_model.clone();
        let params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(&model_path, params).map_err(|err| {
            AppError::internal(format!("failed to load whisper model at {model_path:?}: {err}"))
        })?;

        Ok(Self {
            model_path,
            context: Arc::new(Mutex::new(context)),
        })
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    async fn transcribe(
        &self,
        bytes: &[u8],
        extension: &str,
        _filename: &str,
    ) -> Result<Transcription, AppError> {
        let samples = decode_to_mono_16khz_f32(bytes, extension)?;
        let model_path = self.model_path.clone();
        let context = Arc::clone(&self.context);

        task::spawn_blocking(move || run_whisper(&samples, &model_path, context))
            .await
            .map_err(|err| AppError::service(format!("whisper worker task failed: {err}")))?
    }
}

fn run_whisper(
    samples: &[f32],
    model_path: &str,
    context: Arc<Mutex<WhisperContext>>,
) -> Result<Transcription, AppError> {
    let context_guard = context
        .lock()
        .map_err(|_| AppError::service("failed to lock whisper model context"))?;

    let mut state = context_guard
        .create_state()
        .map_err(|err| AppError::service(format!("failed to create whisper state: {err}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_detect_language(true);

    state.full(params, samples).map_err(|err| {
        AppError::service(format!("whisper inference failed using {model_path:?}: {err}"))
    })?;

    let count = state.full_n_segments();
    let mut segments = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Some(seg) = state.get_segment(i) else {
            continue;
        };
        let text = seg
            .to_str_lossy()
            .map_err(|err| AppError::service(format!("failed to read segment text: {err}")))?
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }

        segments.push(TranscriptSegment {
            start_secs: (seg.start_timestamp() as f64) * 0.01,
            end_secs: (seg.end_timestamp() as f64) * 0.01,
            text,
            avg_logprob: None,
        });
    }

    let text = segments
        .iter()
        .map(|seg| seg.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let language = get_lang_str(state.full_lang_id_from_state()).map(ToOwned::to_owned);

    Ok(Transcription {
        text,
        language,
        segments,
    })
}
