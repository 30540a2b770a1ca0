//! Chunk Repository component: durable storage for chunks, documents, and
//! the relationship graph between chunks.
//!
//! Cross-store transactional coordination (keeping this repository, the
//! vector store, and the sparse index consistent) is the `engine` module's
//! job, not this one's — this component only guarantees its own backend is
//! internally consistent.

pub mod json_backend;
pub mod memory_backend;

use std::sync::Arc;

use uuid::Uuid;

use crate::adapters::DocumentRepositoryBackend;
use crate::error::{RagError, RagResult};
use crate::types::{Chunk, ChunkRelationship, Document};

pub struct ChunkRepository {
    backend: Arc<dyn DocumentRepositoryBackend>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyStats {
    pub chunk_count: u64,
    pub relationship_count: u64,
}

impl ChunkRepository {
    pub fn new(backend: Arc<dyn DocumentRepositoryBackend>) -> Self {
        Self { backend }
    }

    pub async fn put(&self, chunk: Chunk) -> RagResult<()> {
        self.backend.put_chunk(chunk).await.map_err(RagError::from)
    }

    pub async fn put_batch(&self, chunks: Vec<Chunk>) -> RagResult<()> {
        self.backend.put_chunks(chunks).await.map_err(RagError::from)
    }

    pub async fn get(&self, id: Uuid) -> RagResult<Option<Chunk>> {
        self.backend.get_chunk(id).await.map_err(RagError::from)
    }

    pub async fn get_many(&self, ids: &[Uuid]) -> RagResult<Vec<Chunk>> {
        self.backend.get_chunks(ids).await.map_err(RagError::from)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> RagResult<Vec<Chunk>> {
        self.backend.get_chunks_by_document(document_id).await.map_err(RagError::from)
    }

    pub async fn delete(&self, id: Uuid) -> RagResult<()> {
        self.backend.delete_chunk(id).await.map_err(RagError::from)
    }

    pub async fn delete_document(&self, document_id: Uuid) -> RagResult<u64> {
        self.backend.delete_document_chunks(document_id).await.map_err(RagError::from)
    }

    pub async fn put_document(&self, document: Document) -> RagResult<()> {
        self.backend.put_document(document).await.map_err(RagError::from)
    }

    pub async fn get_document(&self, id: Uuid) -> RagResult<Option<Document>> {
        self.backend.get_document(id).await.map_err(RagError::from)
    }

    pub async fn delete_document_record(&self, id: Uuid) -> RagResult<()> {
        self.backend.delete_document(id).await.map_err(RagError::from)
    }

    /// Idempotent insert — two calls with the same (from, to, type) update
    /// strength in place rather than duplicating the edge (spec.md §3,
    /// invariant 2).
    pub async fn put_relationship(&self, relationship: ChunkRelationship) -> RagResult<()> {
        self.backend.put_relationship(relationship).await.map_err(RagError::from)
    }

    pub async fn get_relationships(&self, chunk_id: Uuid) -> RagResult<Vec<ChunkRelationship>> {
        self.backend.get_relationships(chunk_id).await.map_err(RagError::from)
    }

    /// Like `get_relationships`, but restricted to the given relationship
    /// types and sorted `(strength desc, to_id asc)` per spec.md §4.3.
    pub async fn get_relationships_filtered(
        &self,
        chunk_id: Uuid,
        type_filter: Option<&[crate::types::RelationshipType]>,
    ) -> RagResult<Vec<ChunkRelationship>> {
        let mut edges = self.backend.get_relationships(chunk_id).await.map_err(RagError::from)?;
        if let Some(types) = type_filter {
            edges.retain(|e| types.contains(&e.relationship_type));
        }
        edges.sort_by(|a, b| {
            b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.to_chunk.cmp(&b.to_chunk))
        });
        Ok(edges)
    }

    pub async fn hierarchy_stats(&self, document_id: Uuid) -> RagResult<HierarchyStats> {
        let chunks = self.get_by_document(document_id).await?;
        let mut relationship_count = 0u64;
        for chunk in &chunks {
            relationship_count += self.get_relationships(chunk.id).await?.len() as u64;
        }
        Ok(HierarchyStats { chunk_count: chunks.len() as u64, relationship_count: relationship_count / 2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationshipType;
    use chrono::Utc;
    use memory_backend::MemoryRepositoryBackend;

    #[tokio::test]
    async fn hierarchy_stats_counts_chunks_and_undirected_relationships() {
        let repo = ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new()));
        let doc = Uuid::new_v4();
        let now = Utc::now();
        let a = Chunk::new(doc, 0, "a", now);
        let b = Chunk::new(doc, 1, "b", now);
        let (id_a, id_b) = (a.id, b.id);
        repo.put_batch(vec![a, b]).await.unwrap();
        repo.put_relationship(ChunkRelationship::new(id_a, id_b, RelationshipType::Sequential, 1.0))
            .await
            .unwrap();

        let stats = repo.hierarchy_stats(doc).await.unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.relationship_count, 1);
    }

    #[tokio::test]
    async fn get_relationships_filtered_sorts_by_strength_then_id() {
        let repo = ChunkRepository::new(Arc::new(MemoryRepositoryBackend::new()));
        let doc = Uuid::new_v4();
        let now = Utc::now();
        let a = Chunk::new(doc, 0, "a", now);
        let b = Chunk::new(doc, 1, "b", now);
        let c = Chunk::new(doc, 2, "c", now);
        let (id_a, id_b, id_c) = (a.id, b.id, c.id);
        repo.put_batch(vec![a, b, c]).await.unwrap();
        repo.put_relationship(ChunkRelationship::new(id_a, id_b, RelationshipType::Semantic, 0.5)).await.unwrap();
        repo.put_relationship(ChunkRelationship::new(id_a, id_c, RelationshipType::Semantic, 0.9)).await.unwrap();
        repo.put_relationship(ChunkRelationship::new(id_a, id_b, RelationshipType::Sequential, 0.9)).await.unwrap();

        let filtered = repo.get_relationships_filtered(id_a, Some(&[RelationshipType::Semantic])).await.unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].to_chunk, id_c);
        assert_eq!(filtered[1].to_chunk, id_b);
    }
}
