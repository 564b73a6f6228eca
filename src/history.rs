//! JSON history store: one ordered list of records, newest first.
//!
//! The store is a single JSON array file rewritten wholesale on every
//! mutation. A missing or unparsable file reads as empty history rather
//! than an error. Mutations within this process serialize behind an async
//! mutex; writers in other processes are not coordinated.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::analysis::AcousticProfile;
use crate::error::AppError;

/// One persisted summary of a completed upload-processing run.
///
/// Immutable once written. `id` is unix seconds and is not guaranteed
/// unique under concurrent requests; ordering comes from list position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub filename: String,
    pub timestamp: String,
    pub transcript: String,
    pub summary: String,
    pub sonic_dna: AcousticProfile,
    pub bullet_points: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence_score: f64,
    pub word_count: usize,
    pub audio_url: String,
    pub duration: f64,
}

/// Access to the on-disk history list.
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Reads the full ordered record list.
    ///
    /// A missing or corrupt store file is treated as "no history".
    pub async fn load(&self) -> Vec<HistoryRecord> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history file unparsable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Prepends one record, keeping the list in reverse-chronological order.
    pub async fn prepend(&self, record: HistoryRecord) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        records.insert(0, record);
        self.save(&records).await
    }

    /// Removes every record whose filename matches, returning the removed
    /// count. Removing nothing is not an error.
    pub async fn remove_by_filename(&self, filename: &str) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        let before = records.len();
        records.retain(|record| record.filename != filename);
        let removed = before - records.len();
        if removed > 0 {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    async fn save(&self, records: &[HistoryRecord]) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|err| AppError::storage(format!("failed to encode history: {err}")))?;
        fs::write(&self.path, json).await.map_err(|err| {
            AppError::storage(format!(
                "failed to write history file {}: {err}",
                self.path.display()
            ))
        })
    }
}
