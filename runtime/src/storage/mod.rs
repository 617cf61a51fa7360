use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ingest::NormalizedDocument;

pub mod io;
pub mod json_store;
pub mod memory;

pub use json_store::{JsonDocumentStore, JsonDocumentStoreConfig};
pub use memory::MemoryDocumentStore;

pub type StorageResult<T> = Result<T>;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded document and, once ingestion finishes, its normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub fingerprint: String,
    pub status: DocumentStatus,
    pub uploaded_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub document: Option<NormalizedDocument>,
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds spent ingesting, set once processing finishes.
    #[serde(default)]
    pub processing_time: Option<f64>,
}

impl DocumentRecord {
    pub fn processing(filename: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            fingerprint: fingerprint.into(),
            status: DocumentStatus::Processing,
            uploaded_at: now.clone(),
            updated_at: now,
            document: None,
            error: None,
            processing_time: None,
        }
    }

    pub fn mark_ready(&mut self, document: NormalizedDocument) {
        self.status = DocumentStatus::Ready;
        self.document = Some(document);
        self.error = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }
}

/// Content hash used to detect re-uploads of the same file.
pub fn fingerprint(filename: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn initialize(&self) -> StorageResult<()>;
    async fn finalize(&self) -> StorageResult<()>;

    async fn put(&self, record: DocumentRecord) -> StorageResult<()>;
    async fn get(&self, id: &str) -> StorageResult<Option<DocumentRecord>>;
    /// Returns whether a record was removed.
    /// Replaces a record only if it still exists. Returns `false` when it
    /// was deleted in the meantime.
    async fn update_if_present(&self, record: DocumentRecord) -> StorageResult<bool>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> StorageResult<bool>;
    /// All records, newest upload first.
    async fn list(&self) -> StorageResult<Vec<DocumentRecord>>;
    async fn find_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<DocumentRecord>>;

    async fn sync_if_dirty(&self) -> StorageResult<()>;
}
