use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    DocumentRecord, DocumentStore, MemoryDocumentStore,
    io::{ensure_parent_dir, load_or_default, write_json_file},
};

#[derive(Clone, Debug)]
pub struct JsonDocumentStoreConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
}

/// In-memory store persisted to `doc_store_<namespace>.json`. Writes are
/// batched: mutations mark the store dirty and `sync_if_dirty` flushes.
/// Flushes are serialized so an older snapshot never lands after a newer one.
pub struct JsonDocumentStore {
    namespace: String,
    file_path: PathBuf,
    records: MemoryDocumentStore,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
}

impl JsonDocumentStore {
    pub fn new(config: JsonDocumentStoreConfig) -> Self {
        let JsonDocumentStoreConfig {
            working_dir,
            namespace,
        } = config;
        let file_path = working_dir.join(format!("doc_store_{namespace}.json"));

        Self {
            namespace,
            file_path,
            records: MemoryDocumentStore::new(),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn initialize(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let data: HashMap<String, DocumentRecord> = load_or_default(&self.file_path)
            .await
            .with_context(|| format!("failed to load document store {}", self.file_path.display()))?;
        info!(namespace = %self.namespace, documents = data.len(), "document store loaded");
        self.records.replace_all(data).await;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        self.sync_if_dirty().await
    }

    async fn put(&self, record: DocumentRecord) -> Result<()> {
        self.records.put(record).await?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn update_if_present(&self, record: DocumentRecord) -> Result<bool> {
        let updated = self.records.update_if_present(record).await?;
        if updated {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(updated)
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        self.records.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.records.delete(id).await?;
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>> {
        self.records.list().await
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DocumentRecord>> {
        self.records.find_by_fingerprint(fingerprint).await
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        let _flush = self.flush_lock.lock().await;
        // Cleared before the snapshot: a mutation racing the write re-marks
        // the store and is picked up by the next flush.
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = self.records.snapshot().await;
        if let Err(err) = write_json_file(&self.file_path, &snapshot).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err).with_context(|| format!("failed to write document store {}", self.namespace));
        }
        debug!(namespace = %self.namespace, documents = snapshot.len(), "document store flushed");
        Ok(())
    }
}
