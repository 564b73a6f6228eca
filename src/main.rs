mod analysis;
mod api;
mod audio;
mod config;
mod error;
mod history;
mod pdf;
mod pipeline;
mod services;

use std::sync::Arc;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::services::{build_summarizer, build_transcriber, build_translator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribeflow_server=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;
    std::fs::create_dir_all(&cfg.upload_dir)?;

    let transcriber = build_transcriber(&cfg)?;
    let summarizer = build_summarizer(&cfg);
    let translator = build_translator(&cfg);
    let state = Arc::new(AppState::new(
        cfg.clone(),
        transcriber,
        summarizer,
        translator,
    ));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        upload_dir = %cfg.upload_dir.display(),
        history_file = %cfg.history_file.display(),
        asr_backend = ?cfg.asr_backend,
        "starting transcribeflow-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
