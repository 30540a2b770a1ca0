//! In-memory inverted index and exact BM25 scoring.
//!
//! Grounded in the structure of the example pack's
//! `rank-retrieve/src/bm25.rs` `InvertedIndex`, but the IDF term is
//! deliberately the probabilistic (non-Lucene) variant named in spec.md §3:
//! `ln((N - df + 0.5) / (df + 0.5))`, without the `+1` the Lucene variant
//! adds to keep IDF positive for very common terms. That means IDF can go
//! negative for terms present in more than half the corpus — intentional,
//! matching the formula as specified rather than the more defensive Lucene
//! version the pack example uses.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::Bm25Params;

#[derive(Debug, Default, Clone)]
struct Posting {
    term_frequency: HashMap<String, u32>,
    length: u32,
}

#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<Uuid, Posting>,
    /// term -> set of doc ids containing it, used for document frequency.
    document_frequency: HashMap<String, u32>,
    /// term -> doc id -> term frequency, the actual postings list.
    inverted: HashMap<String, HashMap<Uuid, u32>>,
    total_length: u64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    fn average_length(&self) -> f32 {
        if self.postings.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.postings.len() as f32
        }
    }

    pub fn index(&mut self, id: Uuid, text: &str) {
        self.remove(id);

        let tokens = tokenize(text);
        let length = tokens.len() as u32;
        let mut term_frequency: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_frequency.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, tf) in &term_frequency {
            *self.document_frequency.entry(term.clone()).or_insert(0) += 1;
            self.inverted.entry(term.clone()).or_default().insert(id, *tf);
        }

        self.total_length += length as u64;
        self.postings.insert(id, Posting { term_frequency, length });
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let Some(posting) = self.postings.remove(&id) else { return false };
        self.total_length = self.total_length.saturating_sub(posting.length as u64);
        for term in posting.term_frequency.keys() {
            if let Some(df) = self.document_frequency.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.document_frequency.remove(term);
                }
            }
            if let Some(docs) = self.inverted.get_mut(term) {
                docs.remove(&id);
                if docs.is_empty() {
                    self.inverted.remove(term);
                }
            }
        }
        true
    }

    fn idf(&self, term: &str, params: &Bm25Params) -> f32 {
        let n = self.postings.len() as f32;
        let df = *self.document_frequency.get(term).unwrap_or(&0) as f32;
        if n == 0.0 || df == 0.0 {
            return 0.0;
        }
        let _ = params;
        ((n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Query terms (tokenized the same way as indexing) that appear in the
    /// given document, sorted for a stable display order. Empty for an
    /// unknown document id.
    pub fn matched_terms(&self, query: &str, id: Uuid) -> Vec<String> {
        let Some(posting) = self.postings.get(&id) else { return Vec::new() };
        let mut terms: Vec<String> =
            tokenize(query).into_iter().filter(|t| posting.term_frequency.contains_key(t)).collect();
        terms.sort();
        terms.dedup();
        terms
    }

    pub fn score(&self, query: &str, params: &Bm25Params) -> Vec<(Uuid, f32)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.postings.is_empty() {
            return Vec::new();
        }
        let avg_len = self.average_length();
        let mut scores: HashMap<Uuid, f32> = HashMap::new();

        for term in &terms {
            let Some(docs) = self.inverted.get(term) else { continue };
            let idf = self.idf(term, params);
            for (&doc_id, &tf) in docs {
                let Some(posting) = self.postings.get(&doc_id) else { continue };
                let tf = tf as f32;
                let len_norm = 1.0 - params.b + params.b * (posting.length as f32 / avg_len.max(1.0));
                let tf_norm = (tf * (params.k1 + 1.0)) / (tf + params.k1 * len_norm);
                *scores.entry(doc_id).or_insert(0.0) += idf * tf_norm;
            }
        }

        let mut results: Vec<(Uuid, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.0.cmp(&a.0))
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_is_zero_for_unseen_term() {
        let index = InvertedIndex::new();
        assert_eq!(index.idf("ghost", &Bm25Params::default()), 0.0);
    }

    #[test]
    fn term_in_every_document_has_nonpositive_idf() {
        let mut index = InvertedIndex::new();
        index.index(Uuid::new_v4(), "shared term here");
        index.index(Uuid::new_v4(), "shared term there");
        let idf = index.idf("shared", &Bm25Params::default());
        assert!(idf <= 0.0, "idf for universal term should be <= 0 under the non-Lucene formula, got {idf}");
    }

    #[test]
    fn score_ranks_exact_match_above_partial() {
        let mut index = InvertedIndex::new();
        let exact = Uuid::new_v4();
        let partial = Uuid::new_v4();
        index.index(exact, "rust async runtime scheduling");
        index.index(partial, "cooking recipes for dinner");
        let results = index.score("rust async runtime", &Bm25Params::default());
        assert_eq!(results[0].0, exact);
    }

    #[test]
    fn tied_scores_break_by_id_descending() {
        let mut index = InvertedIndex::new();
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        index.index(ids[0], "identical content here");
        index.index(ids[1], "identical content here");
        let results = index.score("identical content", &Bm25Params::default());
        assert_eq!(results[0].1, results[1].1);
        assert_eq!(results[0].0, ids[1]);
        assert_eq!(results[1].0, ids[0]);
    }

    #[test]
    fn remove_drops_document_from_future_scores() {
        let mut index = InvertedIndex::new();
        let id = Uuid::new_v4();
        index.index(id, "ephemeral content");
        assert!(index.remove(id));
        assert!(index.score("ephemeral", &Bm25Params::default()).is_empty());
    }

    #[test]
    fn reindexing_same_id_replaces_rather_than_duplicates() {
        let mut index = InvertedIndex::new();
        let id = Uuid::new_v4();
        index.index(id, "first version of the text");
        index.index(id, "second version entirely different");
        assert_eq!(index.len(), 1);
        assert!(index.score("first", &Bm25Params::default()).is_empty());
        assert!(!index.score("second", &Bm25Params::default()).is_empty());
    }
}
