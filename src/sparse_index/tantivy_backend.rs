//! Durable segment storage for the sparse index.
//!
//! Adapted from the teacher's `search/text_search.rs` `TextSearch`: tantivy
//! owns tokenization and on-disk segments, but scoring is not delegated to
//! it — `InvertedIndex` recomputes BM25 with the exact formula spec.md
//! requires. This type exists purely so chunk text survives a restart and so
//! `SparseIndex::rebuild_from_disk` has something to replay from.

use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter};
use uuid::Uuid;

pub struct TantivyDurableStore {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
}

impl TantivyDurableStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT | STORED);
        let schema = schema_builder.build();

        let directory = MmapDirectory::open(path)?;
        let index = Index::open_or_create(directory, schema)?;
        let reader = index.reader()?;
        let writer = index.writer(50_000_000)?;

        Ok(Self { index, reader, writer, id_field, text_field })
    }

    pub fn index_document(&mut self, id: Uuid, text: &str) -> anyhow::Result<()> {
        self.delete_document(id)?;
        self.writer.add_document(doc!(
            self.id_field => id.to_string(),
            self.text_field => text,
        ))?;
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn delete_document(&mut self, id: Uuid) -> anyhow::Result<()> {
        let term = tantivy::Term::from_field_text(self.id_field, &id.to_string());
        self.writer.delete_term(term);
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Replays every stored (id, text) pair, used to rebuild `InvertedIndex`
    /// after a restart.
    pub fn all_documents(&self) -> anyhow::Result<Vec<(Uuid, String)>> {
        let searcher = self.reader.searcher();
        let mut out = Vec::new();
        for segment_reader in searcher.segment_readers() {
            let store = segment_reader.get_store_reader(10)?;
            for doc_id in 0..segment_reader.max_doc() {
                if segment_reader.is_deleted(doc_id) {
                    continue;
                }
                let document: tantivy::TantivyDocument = store.get(doc_id)?;
                let id_value = document.get_first(self.id_field).and_then(|v| v.as_str());
                let text_value = document.get_first(self.text_field).and_then(|v| v.as_str());
                if let (Some(id_str), Some(text)) = (id_value, text_value) {
                    if let Ok(id) = Uuid::parse_str(id_str) {
                        out.push((id, text.to_string()));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Free-text lookup used only as a durability smoke check; production
    /// scoring always goes through `InvertedIndex::score`.
    pub fn contains_term(&self, term: &str) -> anyhow::Result<bool> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = parser.parse_query(term)?;
        let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
        Ok(!hits.is_empty())
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.writer.delete_all_documents()?;
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}
