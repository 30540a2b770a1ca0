//! TF-IDF keyword extraction, used as the enrichment fallback when no LLM is
//! configured or the LLM call fails. Grounded stylistically in the teacher's
//! `rag/metadata.rs` heuristics — frequency counting plus stopword removal,
//! no external model.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "it", "this", "that",
    "these", "those", "i", "you", "he", "she", "we", "they", "not", "no", "do", "does", "did",
    "have", "has", "had", "will", "would", "can", "could", "should", "may", "might", "must",
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Extracts up to `top_n` (term, score) pairs by term frequency within the
/// chunk, normalized by chunk length. Not true TF-IDF (no corpus-wide
/// document frequency is available at enrichment time since a chunk is
/// enriched before it joins the sparse index) — a frequency-within-chunk
/// proxy that the teacher's metadata pass also uses.
pub fn extract_keywords(text: &str, top_n: usize) -> Vec<(String, f32)> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut counts: HashMap<String, u32> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    let total = tokens.len() as f32;
    let mut scored: Vec<(String, f32)> =
        counts.into_iter().map(|(term, count)| (term, count as f32 / total)).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_n);
    scored
}

/// Crude sentence counter used for readability scoring: counts terminal
/// punctuation, clamped to at least 1 so an empty-punctuation chunk doesn't
/// divide by zero downstream.
pub fn count_sentences(text: &str) -> usize {
    text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count().max(1)
}

/// Flesch-like readability proxy: shorter average sentence/word length scores
/// higher. Scaled to land roughly in `[0, 100]` like the standard Flesch
/// Reading Ease score, without needing a syllable dictionary.
pub fn estimate_readability(text: &str) -> f32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = count_sentences(text) as f32;
    let words_per_sentence = words.len() as f32 / sentences;
    let avg_word_len =
        words.iter().map(|w| w.len() as f32).sum::<f32>() / words.len() as f32;
    (206.835 - 1.015 * words_per_sentence - 84.6 * (avg_word_len / 5.0)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_keywords_drops_stopwords() {
        let keywords = extract_keywords("the quick brown fox jumps over the lazy dog", 10);
        assert!(!keywords.iter().any(|(term, _)| term == "the"));
        assert!(keywords.iter().any(|(term, _)| term == "quick"));
    }

    #[test]
    fn extract_keywords_on_empty_text_is_empty() {
        assert!(extract_keywords("", 5).is_empty());
    }

    #[test]
    fn readability_of_empty_text_is_zero() {
        assert_eq!(estimate_readability(""), 0.0);
    }
}
