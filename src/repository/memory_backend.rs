use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::adapters::DocumentRepositoryBackend;
use crate::types::{Chunk, ChunkRelationship, Document};

#[derive(Default)]
pub struct MemoryRepositoryBackend {
    chunks: RwLock<HashMap<Uuid, Chunk>>,
    documents: RwLock<HashMap<Uuid, Document>>,
    /// keyed by (from, to, type) so `put_relationship` can update in place.
    relationships: RwLock<HashMap<(Uuid, Uuid, u8), ChunkRelationship>>,
}

fn relationship_type_tag(relationship: &ChunkRelationship) -> u8 {
    use crate::types::RelationshipType::*;
    match relationship.relationship_type {
        Sequential => 0,
        Semantic => 1,
        Reference => 2,
        Causal => 3,
        Hierarchical => 4,
        Similarity => 5,
        Contradiction => 6,
        Supplementary => 7,
    }
}

impl MemoryRepositoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepositoryBackend for MemoryRepositoryBackend {
    async fn put_chunk(&self, chunk: Chunk) -> anyhow::Result<()> {
        self.chunks.write().insert(chunk.id, chunk);
        Ok(())
    }

    async fn put_chunks(&self, chunks: Vec<Chunk>) -> anyhow::Result<()> {
        let mut store = self.chunks.write();
        for chunk in chunks {
            store.insert(chunk.id, chunk);
        }
        Ok(())
    }

    async fn get_chunk(&self, id: Uuid) -> anyhow::Result<Option<Chunk>> {
        Ok(self.chunks.read().get(&id).cloned())
    }

    async fn get_chunks(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Chunk>> {
        let store = self.chunks.read();
        Ok(ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }

    async fn get_chunks_by_document(&self, document_id: Uuid) -> anyhow::Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .read()
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn delete_chunk(&self, id: Uuid) -> anyhow::Result<()> {
        self.chunks.write().remove(&id);
        self.relationships.write().retain(|_, r| r.from_chunk != id && r.to_chunk != id);
        Ok(())
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = self
            .chunks
            .read()
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id)
            .collect();
        let count = ids.len() as u64;
        let mut chunks = self.chunks.write();
        let mut relationships = self.relationships.write();
        for id in ids {
            chunks.remove(&id);
            relationships.retain(|_, r| r.from_chunk != id && r.to_chunk != id);
        }
        Ok(count)
    }

    async fn put_document(&self, document: Document) -> anyhow::Result<()> {
        self.documents.write().insert(document.id, document);
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> anyhow::Result<Option<Document>> {
        Ok(self.documents.read().get(&id).cloned())
    }

    async fn delete_document(&self, id: Uuid) -> anyhow::Result<()> {
        self.documents.write().remove(&id);
        Ok(())
    }

    async fn put_relationship(&self, relationship: ChunkRelationship) -> anyhow::Result<()> {
        let key = (relationship.from_chunk, relationship.to_chunk, relationship_type_tag(&relationship));
        self.relationships.write().insert(key, relationship);
        Ok(())
    }

    async fn get_relationships(&self, chunk_id: Uuid) -> anyhow::Result<Vec<ChunkRelationship>> {
        Ok(self
            .relationships
            .read()
            .values()
            .filter(|r| r.from_chunk == chunk_id || r.to_chunk == chunk_id)
            .cloned()
            .collect())
    }
}
