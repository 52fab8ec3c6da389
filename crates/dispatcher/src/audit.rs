//! Quarantine and dead-letter logs
//!
//! Append-only audit trails. The file-backed log writes one JSON object per
//! line; the in-memory log keeps entries for inspection in tests and dry runs.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contracts::{ContractError, DeadLetterRecord, QuarantineEntry};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Append-only audit log
#[async_trait]
pub trait AuditLog<T>: Send + Sync {
    /// Log name (used for logging/metrics)
    fn name(&self) -> &str;

    async fn append(&self, entry: &T) -> Result<(), ContractError>;
}

pub type QuarantineLog = Arc<dyn AuditLog<QuarantineEntry>>;
pub type DeadLetterLog = Arc<dyn AuditLog<DeadLetterRecord>>;

/// JSONL file log
///
/// The file is created (with parent directories) on first append.
pub struct JsonlLog<T> {
    name: String,
    path: PathBuf,
    file: tokio::sync::Mutex<Option<tokio::fs::File>>,
    _entry: PhantomData<fn(&T)>,
}

impl<T> JsonlLog<T> {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            file: tokio::sync::Mutex::new(None),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<tokio::fs::File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

#[async_trait]
impl<T: Serialize + Sync> AuditLog<T> for JsonlLog<T> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "audit_append", skip(self, entry), fields(log = %self.name))]
    async fn append(&self, entry: &T) -> Result<(), ContractError> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
            debug!(path = %self.path.display(), "audit log opened");
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// In-memory log
pub struct MemoryLog<T> {
    name: String,
    entries: Mutex<Vec<T>>,
}

impl<T: Clone> MemoryLog<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<T> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> AuditLog<T> for MemoryLog<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, entry: &T) -> Result<(), ContractError> {
        self.lock().push(entry.clone());
        Ok(())
    }
}
