//! HTTP API surface for the transcription service.
//!
//! This module owns request parsing, input validation, and response
//! formatting while delegating the heavy lifting to the upload pipeline
//! and the external service handles carried in [`AppState`].

use std::io::ErrorKind;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::pdf;
use crate::pipeline::{self, UploadResponse};
use crate::services::{Summarizer, Transcriber, Translator};

/// Human-readable service name returned by the status endpoint.
pub const APP_NAME: &str = "transcribeflow-server";
/// Service version string returned by the status endpoint.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// Transcription service handle.
    pub transcriber: Arc<dyn Transcriber>,
    /// Summarization service handle.
    pub summarizer: Arc<dyn Summarizer>,
    /// Translation service handle.
    pub translator: Arc<dyn Translator>,
    /// History store for processed uploads.
    pub history: HistoryStore,
}

impl AppState {
    /// Constructs shared handler state.
    pub fn new(
        cfg: AppConfig,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let history = HistoryStore::new(cfg.history_file.clone());
        Self {
            cfg,
            transcriber,
            summarizer,
            translator,
            history,
        }
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.cfg.max_upload_bytes;
    Router::new()
        .route("/", get(status))
        .route("/upload", post(upload))
        .route("/translate", post(translate))
        .route("/history", get(history))
        .route("/delete/:filename", delete(delete_upload))
        .route("/uploads/:filename", get(serve_upload))
        .route("/download_pdf", post(download_pdf))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

/// Service status endpoint (`GET /`).
async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": APP_NAME,
        "version": APP_VERSION,
    }))
}

/// Runs the upload pipeline on a multipart file (`POST /upload`).
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::invalid_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("audio") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(AppError::invalid_request("No selected file"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::invalid_request(format!("failed to read file bytes: {err}")))?;
        file = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = file.ok_or_else(|| AppError::invalid_request("No file part"))?;

    let response = pipeline::process_upload(
        &state.cfg,
        state.transcriber.as_ref(),
        state.summarizer.as_ref(),
        &state.history,
        &filename,
        bytes,
    )
    .await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct TranslateRequest {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    summary: String,
    #[serde(default = "default_target_lang")]
    target_lang: String,
}

fn default_target_lang() -> String {
    "es".to_string()
}

/// Translates transcript and summary text (`POST /translate`).
async fn translate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let translated_transcript = if req.transcript.is_empty() {
        String::new()
    } else {
        state
            .translator
            .translate(&req.transcript, &req.target_lang)
            .await?
    };
    let translated_summary = if req.summary.is_empty() {
        String::new()
    } else {
        state
            .translator
            .translate(&req.summary, &req.target_lang)
            .await?
    };

    Ok(Json(json!({
        "translated_transcript": translated_transcript,
        "translated_summary": translated_summary,
    })))
}

/// Returns the full history list, newest first (`GET /history`).
async fn history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryRecord>> {
    Json(state.history.load().await)
}

/// Removes an uploaded asset and its history entries
/// (`DELETE /delete/{filename}`).
async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filename = pipeline::sanitize_filename(&filename)?;
    state.history.remove_by_filename(&filename).await?;

    let asset_path = state.cfg.upload_dir.join(&filename);
    match tokio::fs::remove_file(&asset_path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(AppError::storage(format!(
                "failed to remove uploaded file: {err}"
            )));
        }
    }

    Ok(Json(json!({"message": "File deleted"})))
}

/// Serves a stored upload (`GET /uploads/{filename}`).
async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let filename = pipeline::sanitize_filename(&filename)?;
    let asset_path = state.cfg.upload_dir.join(&filename);

    let bytes = tokio::fs::read(&asset_path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::not_found("File not found")
        } else {
            AppError::storage(format!("failed to read uploaded file: {err}"))
        }
    })?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response())
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct PdfRequest {
    #[serde(default = "default_pdf_title")]
    title: String,
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    summary: String,
}

fn default_pdf_title() -> String {
    "Transcript".to_string()
}

/// Renders the report PDF as an attachment (`POST /download_pdf`).
async fn download_pdf(Json(req): Json<PdfRequest>) -> Response {
    let pdf = pdf::render_report(&req.title, &req.summary, &req.transcript);
    let disposition = format!(
        "attachment; filename=\"{}_report.pdf\"",
        req.title.replace(['"', '\\', '/'], "_")
    );

    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::analysis::FALLBACK_PROFILE;
    use crate::audio::test_support::sine_wav;
    use crate::config::{AppConfig, AsrBackendKind};
    use crate::error::AppError;
    use crate::history::HistoryRecord;
    use crate::pipeline::SHORT_AUDIO_SUMMARY;
    use crate::services::{
        Summarizer, Transcriber, Transcription, TranscriptSegment, Translator,
    };

    use super::{build_router, AppState};

    struct MockTranscriber {
        text: String,
        logprobs: Vec<f64>,
    }

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(
            &self,
            _bytes: &[u8],
            _extension: &str,
            _filename: &str,
        ) -> Result<Transcription, AppError> {
            let segments = self
                .logprobs
                .iter()
                .map(|lp| TranscriptSegment {
                    start_secs: 0.0,
                    end_secs: 1.0,
                    text: self.text.clone(),
                    avg_logprob: Some(*lp),
                })
                .collect();
            Ok(Transcription {
                text: self.text.clone(),
                language: Some("en".to_string()),
                segments,
            })
        }
    }

    struct MockSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for MockSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }

    struct MockTranslator;

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate(&self, text: &str, target_lang: &str) -> Result<String, AppError> {
            Ok(format!("[{target_lang}] {text}"))
        }
    }

    fn test_cfg(dir: &std::path::Path) -> AppConfig {
        let upload_dir = dir.join("uploads");
        fs::create_dir_all(&upload_dir).unwrap();
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 5001,
            upload_dir,
            history_file: dir.join("history.json"),
            max_upload_bytes: 10 * 1024 * 1024,
            asr_backend: AsrBackendKind::Http,
            asr_endpoint: "http://127.0.0.1:1/unused".to_string(),
            asr_api_key: None,
            asr_model: "whisper-1".to_string(),
            whisper_model: "unused".to_string(),
            summarizer_endpoint: "http://127.0.0.1:1/unused".to_string(),
            summarizer_api_key: None,
            translate_endpoint: "http://127.0.0.1:1/unused".to_string(),
        }
    }

    fn test_state(dir: &std::path::Path, transcript: &str, logprobs: Vec<f64>) -> Arc<AppState> {
        Arc::new(AppState::new(
            test_cfg(dir),
            Arc::new(MockTranscriber {
                text: transcript.to_string(),
                logprobs,
            }),
            Arc::new(MockSummarizer("Mock summary of the meeting content here.")),
            Arc::new(MockTranslator),
        ))
    }

    fn multipart_body(boundary: &str, field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .uri("/upload")
            .method("POST")
            .header(
                "Content-Type",
                "multipart/form-data; boundary=X-BOUNDARY".to_string(),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn parse_json_response(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), 16 * 1024 * 1024)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn seed_record(filename: &str) -> HistoryRecord {
        HistoryRecord {
            id: 1,
            filename: filename.to_string(),
            timestamp: "2024-01-01 12:00:00".to_string(),
            transcript: "t".to_string(),
            summary: "s".to_string(),
            sonic_dna: FALLBACK_PROFILE,
            bullet_points: vec![],
            keywords: vec![],
            confidence_score: 0.95,
            word_count: 1,
            audio_url: format!("/uploads/{filename}"),
            duration: 1.0,
        }
    }

    #[tokio::test]
    async fn status_reports_service_name() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", vec![]));

        let req = Request::builder()
            .uri("/")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["name"], super::APP_NAME);
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_extension_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", vec![]);
        let app = build_router(state.clone());

        let body = multipart_body("X-BOUNDARY", "audio", "notes.txt", b"not audio");
        let res = app.oneshot(upload_request(body)).await.expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "File type not allowed");
        assert!(!state.cfg.upload_dir.join("notes.txt").exists());
        assert!(state.history.load().await.is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_missing_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", vec![]));

        let body = multipart_body("X-BOUNDARY", "something_else", "a.wav", b"bytes");
        let res = app.oneshot(upload_request(body)).await.expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "No file part");
    }

    #[tokio::test]
    async fn upload_processes_short_wav_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            "hello world from the mock transcriber",
            vec![-0.2, -0.4],
        );
        let app = build_router(state.clone());

        let wav = sine_wav(2.0, 8000, 0.5);
        let body = multipart_body("X-BOUNDARY", "audio", "talk.wav", &wav);
        let res = app.oneshot(upload_request(body)).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["filename"], "talk.wav");
        assert_eq!(payload["summary"], SHORT_AUDIO_SUMMARY);
        assert_eq!(payload["word_count"], 6);
        assert_eq!(payload["audio_url"], "/uploads/talk.wav");
        assert_eq!(payload["keywords"], serde_json::json!(["Transcriber"]));
        assert_eq!(
            payload["bullet_points"],
            serde_json::json!(["Audio too short for AI summary"])
        );

        let duration = payload["duration"].as_f64().unwrap();
        assert!((duration - 2.0).abs() < 0.05);

        let expected_confidence = ((-0.2f64).exp() + (-0.4f64).exp()) / 2.0;
        let confidence = payload["confidence_score"].as_f64().unwrap();
        assert!((confidence - expected_confidence).abs() < 1e-9);

        // 6 words over 2 seconds.
        assert_eq!(payload["sonic_dna"]["pace"], 180);
        assert_eq!(payload["sonic_dna"]["energy"], 100);
        let clarity = payload["sonic_dna"]["clarity"].as_i64().unwrap();
        assert!((0..=100).contains(&clarity));

        assert!(state.cfg.upload_dir.join("talk.wav").exists());
        let records = state.history.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "talk.wav");
        assert_eq!(records[0].summary, SHORT_AUDIO_SUMMARY);
    }

    #[tokio::test]
    async fn upload_summarizes_long_transcripts() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = "word ".repeat(60).trim().to_string();
        let state = test_state(dir.path(), &transcript, vec![-0.1]);
        let app = build_router(state.clone());

        let wav = sine_wav(1.0, 8000, 0.5);
        let body = multipart_body("X-BOUNDARY", "audio", "long.wav", &wav);
        let res = app.oneshot(upload_request(body)).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["summary"], "Mock summary of the meeting content here.");
        assert_eq!(payload["word_count"], 60);

        let records = state.history.load().await;
        assert_eq!(records[0].summary, "Mock summary of the meeting content here.");
    }

    #[tokio::test]
    async fn history_returns_empty_list_for_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", vec![]);
        fs::write(&state.cfg.history_file, "{broken").unwrap();
        let app = build_router(state);

        let req = Request::builder()
            .uri("/history")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload, serde_json::json!([]));
    }

    #[tokio::test]
    async fn delete_removes_matching_history_and_asset() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", vec![]);
        state.history.prepend(seed_record("x.wav")).await.unwrap();
        state.history.prepend(seed_record("keep.wav")).await.unwrap();
        fs::write(state.cfg.upload_dir.join("x.wav"), b"bytes").unwrap();

        let app = build_router(state.clone());
        let req = Request::builder()
            .uri("/delete/x.wav")
            .method("DELETE")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["message"], "File deleted");
        assert!(!state.cfg.upload_dir.join("x.wav").exists());

        let records = state.history.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "keep.wav");
    }

    #[tokio::test]
    async fn delete_of_unknown_filename_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", vec![]);
        state.history.prepend(seed_record("keep.wav")).await.unwrap();

        let app = build_router(state.clone());
        let req = Request::builder()
            .uri("/delete/ghost.wav")
            .method("DELETE")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(state.history.load().await.len(), 1);
    }

    #[tokio::test]
    async fn uploads_route_serves_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "hi", vec![]);
        fs::write(state.cfg.upload_dir.join("a.mp3"), b"abc").unwrap();

        let app = build_router(state);
        let req = Request::builder()
            .uri("/uploads/a.mp3")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "audio/mpeg"
        );
        let bytes = to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[tokio::test]
    async fn uploads_route_404s_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", vec![]));

        let req = Request::builder()
            .uri("/uploads/missing.mp3")
            .body(Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn translate_uses_translator_and_skips_empty_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", vec![]));

        let req = Request::builder()
            .uri("/translate")
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(
                serde_json::json!({"transcript": "hola", "summary": "", "target_lang": "en"})
                    .to_string(),
            ))
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["translated_transcript"], "[en] hola");
        assert_eq!(payload["translated_summary"], "");
    }

    #[tokio::test]
    async fn download_pdf_returns_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path(), "hi", vec![]));

        let req = Request::builder()
            .uri("/download_pdf")
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "title": "Standup",
                    "transcript": "we talked",
                    "summary": "short"
                })
                .to_string(),
            ))
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/pdf"
        );
        assert!(res
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Standup_report.pdf"));

        let bytes = to_bytes(res.into_body(), 16 * 1024 * 1024).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
    }
}
