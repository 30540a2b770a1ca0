use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::adapters::VectorStoreBackend;

/// In-memory `VectorStoreBackend`, used by tests and as a reference
/// implementation for what a backend must guarantee.
#[derive(Default)]
pub struct MemoryVectorBackend {
    vectors: RwLock<HashMap<Uuid, Vec<f32>>>,
    /// document_id isn't known to the plain (id, vector) shape this trait
    /// exposes, so callers track ownership separately; kept here only so
    /// `delete_by_document` has something to act on in tests that register it.
    document_links: RwLock<HashMap<Uuid, Uuid>>,
}

impl MemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_document(&self, chunk_id: Uuid, document_id: Uuid) {
        self.document_links.write().insert(chunk_id, document_id);
    }
}

#[async_trait]
impl VectorStoreBackend for MemoryVectorBackend {
    async fn put_batch(&self, records: Vec<(Uuid, Vec<f32>)>) -> anyhow::Result<()> {
        let mut vectors = self.vectors.write();
        for (id, vector) in records {
            vectors.insert(id, vector);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vec<f32>>> {
        Ok(self.vectors.read().get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.vectors.write().remove(&id);
        self.document_links.write().remove(&id);
        Ok(())
    }

    async fn delete_by_document(&self, document_id: Uuid) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = self
            .document_links
            .read()
            .iter()
            .filter(|(_, doc)| **doc == document_id)
            .map(|(chunk, _)| *chunk)
            .collect();
        let count = ids.len() as u64;
        let mut vectors = self.vectors.write();
        let mut links = self.document_links.write();
        for id in ids {
            vectors.remove(&id);
            links.remove(&id);
        }
        Ok(count)
    }

    async fn scan_all(&self) -> anyhow::Result<Vec<(Uuid, Vec<f32>)>> {
        Ok(self.vectors.read().iter().map(|(id, v)| (*id, v.clone())).collect())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.vectors.read().len() as u64)
    }
}
