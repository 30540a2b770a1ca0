use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{CacheEntry, Chunk, ChunkRelationship, Document};

/// Durable storage for raw vectors + the chunk id they belong to. The ANN
/// graph (`vector_store::hnsw`) is built and held in memory on top of
/// whatever this trait persists — grounded in the teacher's `LanceStore`,
/// generalized so lancedb is one implementation among several (see
/// `vector_store::lance_backend`, `vector_store::memory_backend`).
#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    async fn put_batch(&self, records: Vec<(Uuid, Vec<f32>)>) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vec<f32>>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn delete_by_document(&self, document_id: Uuid) -> anyhow::Result<u64>;
    /// Full scan, used once at startup to rebuild the in-memory HNSW graph
    /// and by the auto-tuner to build golden-set comparisons.
    async fn scan_all(&self) -> anyhow::Result<Vec<(Uuid, Vec<f32>)>>;
    async fn count(&self) -> anyhow::Result<u64>;
}

/// Durable storage for chunks, documents, and the relationship graph between
/// chunks. Grounded in the teacher's `space::SpaceManager` (JSON-file CRUD
/// pattern) generalized to the chunk/document/relationship shape this crate
/// needs.
#[async_trait]
pub trait DocumentRepositoryBackend: Send + Sync {
    async fn put_chunk(&self, chunk: Chunk) -> anyhow::Result<()>;
    async fn put_chunks(&self, chunks: Vec<Chunk>) -> anyhow::Result<()>;
    async fn get_chunk(&self, id: Uuid) -> anyhow::Result<Option<Chunk>>;
    async fn get_chunks(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Chunk>>;
    async fn get_chunks_by_document(&self, document_id: Uuid) -> anyhow::Result<Vec<Chunk>>;
    async fn delete_chunk(&self, id: Uuid) -> anyhow::Result<()>;
    async fn delete_document_chunks(&self, document_id: Uuid) -> anyhow::Result<u64>;

    async fn put_document(&self, document: Document) -> anyhow::Result<()>;
    async fn get_document(&self, id: Uuid) -> anyhow::Result<Option<Document>>;
    async fn delete_document(&self, id: Uuid) -> anyhow::Result<()>;

    /// Idempotent: inserting the same (from, to, type) edge twice updates
    /// strength in place rather than duplicating the edge.
    async fn put_relationship(&self, relationship: ChunkRelationship) -> anyhow::Result<()>;
    async fn get_relationships(&self, chunk_id: Uuid) -> anyhow::Result<Vec<ChunkRelationship>>;
}

/// Durable storage for the semantic cache. The similarity scan itself lives
/// in `cache::SemanticCache`; this trait only owns persistence, mirroring the
/// teacher's `memory::MemorySystem` separation of storage from policy.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn put(&self, key: Uuid, entry: CacheEntry) -> anyhow::Result<()>;
    async fn get(&self, key: Uuid) -> anyhow::Result<Option<CacheEntry>>;
    async fn remove(&self, key: Uuid) -> anyhow::Result<()>;
    async fn all(&self) -> anyhow::Result<Vec<(Uuid, CacheEntry)>>;
    async fn clear(&self) -> anyhow::Result<()>;
    async fn len(&self) -> anyhow::Result<usize>;
}
