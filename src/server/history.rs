//! Recent-conversion history, persisted as a JSON array (newest first).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// Number of entries kept by default.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// One finished conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: String,
    /// Sanitised upload filename, e.g. `report.pdf`.
    pub filename: String,
    /// Folder holding the document, images and `meta.json`.
    pub output_path: PathBuf,
    /// The rendered document file.
    pub document_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub has_preview: bool,
}

impl ConversionRecord {
    pub fn metadata_path(&self) -> PathBuf {
        self.output_path.join(crate::output::METADATA_FILE)
    }
}

/// File-backed history. All access goes through one mutex.
#[derive(Debug)]
pub struct ConversionHistory {
    path: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

impl ConversionHistory {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, newest first. A missing or corrupt file reads as empty.
    pub async fn recent(&self) -> Vec<ConversionRecord> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    pub async fn get(&self, id: &str) -> Option<ConversionRecord> {
        self.recent().await.into_iter().find(|r| r.id == id)
    }

    /// Prepend a record and truncate to the configured size.
    pub async fn add(&self, record: ConversionRecord) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_unlocked().await;
        records.insert(0, record);
        records.truncate(self.max_entries);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&records).map_err(std::io::Error::other)?;
        tokio::fs::write(&self.path, json).await
    }

    async fn read_unlocked(&self) -> Vec<ConversionRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read history {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt history {}: {}", self.path.display(), e);
            Vec::new()
        })
    }
}
