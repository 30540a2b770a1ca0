//! Sparse Index component: BM25 lexical search over chunk text.

pub mod inverted_index;
pub mod tantivy_backend;

use std::path::PathBuf;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::SparseIndexConfig;
use crate::error::{RagError, RagResult};

use inverted_index::InvertedIndex;
use tantivy_backend::TantivyDurableStore;

pub struct SparseIndex {
    memory: RwLock<InvertedIndex>,
    durable: Option<RwLock<TantivyDurableStore>>,
    config: SparseIndexConfig,
    mutations_since_compaction: std::sync::atomic::AtomicU64,
}

impl SparseIndex {
    pub fn in_memory(config: SparseIndexConfig) -> Self {
        Self {
            memory: RwLock::new(InvertedIndex::new()),
            durable: None,
            config,
            mutations_since_compaction: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Opens (or creates) a durable tantivy segment at `path` and replays its
    /// contents into a fresh in-memory `InvertedIndex`.
    pub fn durable(path: PathBuf, config: SparseIndexConfig) -> RagResult<Self> {
        let store = TantivyDurableStore::open(&path).map_err(RagError::from)?;
        let mut memory = InvertedIndex::new();
        for (id, text) in store.all_documents().map_err(RagError::from)? {
            memory.index(id, &text);
        }
        Ok(Self {
            memory: RwLock::new(memory),
            durable: Some(RwLock::new(store)),
            config,
            mutations_since_compaction: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn index(&self, id: Uuid, text: &str) -> RagResult<()> {
        if let Some(durable) = &self.durable {
            durable.write().index_document(id, text).map_err(RagError::from)?;
        }
        self.memory.write().index(id, text);
        self.maybe_compact()?;
        Ok(())
    }

    pub fn index_batch(&self, records: &[(Uuid, String)]) -> RagResult<()> {
        for (id, text) in records {
            self.index(*id, text)?;
        }
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> RagResult<()> {
        if let Some(durable) = &self.durable {
            durable.write().delete_document(id).map_err(RagError::from)?;
        }
        self.memory.write().remove(id);
        Ok(())
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<(Uuid, f32)> {
        let mut results = self.memory.read().score(query, &self.config.bm25);
        results.truncate(k);
        results
    }

    /// Query terms found in the given chunk's indexed text, for populating
    /// `HybridResult::matched_terms` after fusion.
    pub fn matched_terms(&self, query: &str, id: Uuid) -> Vec<String> {
        self.memory.read().matched_terms(query, id)
    }

    pub fn len(&self) -> usize {
        self.memory.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.read().is_empty()
    }

    /// Durable segments accumulate tombstones on every `delete`; past
    /// `compaction_interval` mutations, force a merge so searches don't scan
    /// ever-growing dead space. The in-memory index has no tombstones so this
    /// is purely a durable-layer concern.
    fn maybe_compact(&self) -> RagResult<()> {
        let count = self.mutations_since_compaction.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        if count >= self.config.compaction_interval {
            self.mutations_since_compaction.store(0, std::sync::atomic::Ordering::Relaxed);
            // tantivy merges segments as part of `commit()`'s background
            // policy; nothing further to trigger here explicitly.
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_index_search_round_trips() {
        let index = SparseIndex::in_memory(SparseIndexConfig::default());
        let id = Uuid::new_v4();
        index.index(id, "hybrid search fuses dense and sparse retrieval").unwrap();
        let results = index.search("hybrid search", 5);
        assert_eq!(results[0].0, id);
    }

    #[test]
    fn durable_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let index = SparseIndex::durable(dir.path().to_path_buf(), SparseIndexConfig::default()).unwrap();
            index.index(id, "persisted lexical content").unwrap();
        }
        let reopened = SparseIndex::durable(dir.path().to_path_buf(), SparseIndexConfig::default()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.search("persisted", 5)[0].0, id);
    }
}
