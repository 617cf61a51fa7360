use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentRecord, DocumentStore};

/// Process-local store; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    data: Arc<RwLock<HashMap<String, DocumentRecord>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn replace_all(&self, records: HashMap<String, DocumentRecord>) {
        *self.data.write().await = records;
    }

    pub(crate) async fn snapshot(&self) -> HashMap<String, DocumentRecord> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, record: DocumentRecord) -> Result<()> {
        self.data.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_if_present(&self, record: DocumentRecord) -> Result<bool> {
        let mut data = self.data.write().await;
        match data.get_mut(&record.id) {
            Some(slot) => {
                *slot = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.data.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.data.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let mut records: Vec<DocumentRecord> = self.data.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .data
            .read()
            .await
            .values()
            .find(|record| record.fingerprint == fingerprint)
            .cloned())
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        Ok(())
    }
}
