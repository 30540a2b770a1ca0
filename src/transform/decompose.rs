//! Query decomposition: splits a compound query into independently
//! searchable sub-queries.
//!
//! Adapted from the teacher's `rag/query_decomposer.rs`: the same
//! regex-driven splitting strategies (conjunction, question-mark,
//! enumerated list, comparative), the same non-split phrase guard so common
//! fixed expressions ("rock and roll", "back and forth") don't get cut on
//! "and", and the same round-robin merge for recombining sub-query results.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::types::HasIdAndScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DecompositionStrategy {
    None,
    Conjunction,
    QuestionMarks,
    Enumerated,
    Comparative,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecomposedQuery {
    pub original: String,
    pub sub_queries: Vec<String>,
    pub strategy: DecompositionStrategy,
}

static CONJUNCTION_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+|\s+also\s+|;\s*").unwrap());
static QUESTION_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?\s*").unwrap());
static ENUMERATED_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)(?:first|second|third|finally|\d+\.)\s*[:,]?\s*").unwrap());
static COMPARATIVE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:vs\.?|versus|compared to)\s+").unwrap());

/// Fixed expressions that contain a splitting keyword but should never be
/// split on it. Matched case-insensitively against the whole query.
const NON_SPLIT_PHRASES: &[&str] = &[
    "rock and roll",
    "back and forth",
    "up and down",
    "black and white",
    "here and there",
    "law and order",
];

fn contains_protected_phrase(query: &str) -> bool {
    let lower = query.to_lowercase();
    NON_SPLIT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn clean_parts(parts: Vec<&str>) -> Vec<String> {
    parts
        .into_iter()
        .map(|p| p.trim().trim_matches(|c: char| ".,:;".contains(c)).trim().to_string())
        .filter(|p| p.len() > 2)
        .collect()
}

pub fn decompose_query(query: &str) -> DecomposedQuery {
    let trimmed = query.trim();

    if !contains_protected_phrase(trimmed) && ENUMERATED_SPLIT.is_match(trimmed) {
        let parts = clean_parts(ENUMERATED_SPLIT.split(trimmed).collect());
        if parts.len() > 1 {
            return DecomposedQuery {
                original: query.to_string(),
                sub_queries: parts,
                strategy: DecompositionStrategy::Enumerated,
            };
        }
    }

    if COMPARATIVE_SPLIT.is_match(trimmed) {
        let parts = clean_parts(COMPARATIVE_SPLIT.split(trimmed).collect());
        if parts.len() > 1 {
            return DecomposedQuery {
                original: query.to_string(),
                sub_queries: parts,
                strategy: DecompositionStrategy::Comparative,
            };
        }
    }

    let question_parts: Vec<&str> = QUESTION_SPLIT.split(trimmed).filter(|p| !p.trim().is_empty()).collect();
    if question_parts.len() > 1 {
        let parts = clean_parts(question_parts);
        if parts.len() > 1 {
            return DecomposedQuery {
                original: query.to_string(),
                sub_queries: parts,
                strategy: DecompositionStrategy::QuestionMarks,
            };
        }
    }

    if !contains_protected_phrase(trimmed) && CONJUNCTION_SPLIT.is_match(trimmed) {
        let parts = clean_parts(CONJUNCTION_SPLIT.split(trimmed).collect());
        if parts.len() > 1 {
            return DecomposedQuery {
                original: query.to_string(),
                sub_queries: parts,
                strategy: DecompositionStrategy::Conjunction,
            };
        }
    }

    DecomposedQuery {
        original: query.to_string(),
        sub_queries: vec![trimmed.to_string()],
        strategy: DecompositionStrategy::None,
    }
}

/// Round-robin merges per-sub-query result lists into one deduped ranking:
/// take the best unseen result from each list in turn rather than
/// concatenating (which would bias toward whichever sub-query ran first).
pub fn merge_results<T: HasIdAndScore + Clone>(result_lists: Vec<Vec<T>>) -> Vec<T> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut merged = Vec::new();
    let mut cursors = vec![0usize; result_lists.len()];

    loop {
        let mut advanced = false;
        for (list_idx, list) in result_lists.iter().enumerate() {
            while cursors[list_idx] < list.len() {
                let candidate = &list[cursors[list_idx]];
                cursors[list_idx] += 1;
                if seen.insert(candidate.id()) {
                    merged.push(candidate.clone());
                    advanced = true;
                    break;
                }
            }
        }
        if !advanced {
            break;
        }
    }

    merged.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Scored {
        id: Uuid,
        score: f32,
    }
    impl HasIdAndScore for Scored {
        fn id(&self) -> Uuid {
            self.id
        }
        fn score(&self) -> f32 {
            self.score
        }
    }

    #[test]
    fn splits_on_conjunction() {
        let result = decompose_query("find papers about transformers and also about diffusion models");
        assert_eq!(result.strategy, DecompositionStrategy::Conjunction);
        assert_eq!(result.sub_queries.len(), 2);
    }

    #[test]
    fn protects_fixed_phrases_from_conjunction_split() {
        let result = decompose_query("tell me about rock and roll history");
        assert_eq!(result.strategy, DecompositionStrategy::None);
        assert_eq!(result.sub_queries.len(), 1);
    }

    #[test]
    fn splits_on_comparative_marker() {
        let result = decompose_query("HNSW versus IVF indexing");
        assert_eq!(result.strategy, DecompositionStrategy::Comparative);
        assert_eq!(result.sub_queries.len(), 2);
    }

    #[test]
    fn splits_enumerated_list() {
        let result = decompose_query("first explain BM25, second explain cosine similarity");
        assert_eq!(result.strategy, DecompositionStrategy::Enumerated);
        assert_eq!(result.sub_queries.len(), 2);
    }

    #[test]
    fn simple_query_is_not_decomposed() {
        let result = decompose_query("what is hybrid search");
        assert_eq!(result.strategy, DecompositionStrategy::None);
        assert_eq!(result.sub_queries, vec!["what is hybrid search".to_string()]);
    }

    #[test]
    fn merge_results_round_robins_and_dedupes() {
        let shared = Uuid::new_v4();
        let a = vec![
            Scored { id: shared, score: 0.9 },
            Scored { id: Uuid::new_v4(), score: 0.5 },
        ];
        let b = vec![
            Scored { id: shared, score: 0.7 },
            Scored { id: Uuid::new_v4(), score: 0.6 },
        ];
        let merged = merge_results(vec![a, b]);
        let unique_ids: HashSet<Uuid> = merged.iter().map(|s| s.id).collect();
        assert_eq!(unique_ids.len(), merged.len());
        assert_eq!(merged.len(), 3);
    }
}
