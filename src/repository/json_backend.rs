//! JSON-file-backed `DocumentRepositoryBackend`.
//!
//! Adapted from the teacher's `space::SpaceManager`: the whole store lives in
//! memory behind a lock and is flushed to a single JSON file after every
//! mutation. Fine for the embedded/single-process deployments this crate
//! targets; not meant to scale to concurrent writers across processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::DocumentRepositoryBackend;
use crate::types::{Chunk, ChunkRelationship, Document};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    chunks: HashMap<Uuid, Chunk>,
    documents: HashMap<Uuid, Document>,
    relationships: Vec<ChunkRelationship>,
}

pub struct JsonRepositoryBackend {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl JsonRepositoryBackend {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Snapshot::default()
        };
        Ok(Self { path, state: Mutex::new(state) })
    }

    fn flush(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentRepositoryBackend for JsonRepositoryBackend {
    async fn put_chunk(&self, chunk: Chunk) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.chunks.insert(chunk.id, chunk);
        self.flush(&state)
    }

    async fn put_chunks(&self, chunks: Vec<Chunk>) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        for chunk in chunks {
            state.chunks.insert(chunk.id, chunk);
        }
        self.flush(&state)
    }

    async fn get_chunk(&self, id: Uuid) -> anyhow::Result<Option<Chunk>> {
        Ok(self.state.lock().unwrap().chunks.get(&id).cloned())
    }

    async fn get_chunks(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Chunk>> {
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect())
    }

    async fn get_chunks_by_document(&self, document_id: Uuid) -> anyhow::Result<Vec<Chunk>> {
        let state = self.state.lock().unwrap();
        let mut chunks: Vec<Chunk> =
            state.chunks.values().filter(|c| c.document_id == document_id).cloned().collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn delete_chunk(&self, id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.chunks.remove(&id);
        state.relationships.retain(|r| r.from_chunk != id && r.to_chunk != id);
        self.flush(&state)
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> anyhow::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let ids: Vec<Uuid> = state
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            state.chunks.remove(id);
        }
        state.relationships.retain(|r| !ids.contains(&r.from_chunk) && !ids.contains(&r.to_chunk));
        self.flush(&state)?;
        Ok(ids.len() as u64)
    }

    async fn put_document(&self, document: Document) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(document.id, document);
        self.flush(&state)
    }

    async fn get_document(&self, id: Uuid) -> anyhow::Result<Option<Document>> {
        Ok(self.state.lock().unwrap().documents.get(&id).cloned())
    }

    async fn delete_document(&self, id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.documents.remove(&id);
        self.flush(&state)
    }

    async fn put_relationship(&self, relationship: ChunkRelationship) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) =
            state.relationships.iter_mut().find(|r| r.same_edge(&relationship))
        {
            existing.strength = relationship.strength;
        } else {
            state.relationships.push(relationship);
        }
        self.flush(&state)
    }

    async fn get_relationships(&self, chunk_id: Uuid) -> anyhow::Result<Vec<ChunkRelationship>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .relationships
            .iter()
            .filter(|r| r.from_chunk == chunk_id || r.to_chunk == chunk_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.json");
        let doc = Uuid::new_v4();
        let chunk = Chunk::new(doc, 0, "hello", Utc::now());
        let chunk_id = chunk.id;
        {
            let backend = JsonRepositoryBackend::open(path.clone()).unwrap();
            backend.put_chunk(chunk).await.unwrap();
        }
        let reopened = JsonRepositoryBackend::open(path).unwrap();
        let fetched = reopened.get_chunk(chunk_id).await.unwrap();
        assert!(fetched.is_some());
    }
}
