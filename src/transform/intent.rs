//! `intent()` contract operation (spec.md §4.6): a richer, multi-intent read
//! on a query than the Analyzer's single `QueryIntent` classification —
//! ranks every matching intent by confidence instead of picking just one,
//! and adds a coarse domain guess. Grounded on the same regex-cue approach
//! as `analyzer::QueryAnalyzer`, generalized from "pick the first match" to
//! "score every cue and keep them all".

use std::collections::HashMap;

use crate::analyzer::QueryIntent;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntentResult {
    pub primary_intent: QueryIntent,
    pub secondary_intents: Vec<QueryIntent>,
    pub confidence_by_intent: HashMap<String, f32>,
    pub domain: String,
    pub complexity: crate::analyzer::QueryComplexity,
}

const CUES: &[(QueryIntent, &str, f32)] = &[
    (QueryIntent::Procedural, "how to", 0.85),
    (QueryIntent::Procedural, "steps to", 0.8),
    (QueryIntent::Procedural, "guide", 0.6),
    (QueryIntent::Procedural, "tutorial", 0.6),
    (QueryIntent::Comparative, "vs", 0.85),
    (QueryIntent::Comparative, "versus", 0.85),
    (QueryIntent::Comparative, "compared to", 0.8),
    (QueryIntent::Comparative, "difference between", 0.8),
    (QueryIntent::Navigational, "find", 0.55),
    (QueryIntent::Navigational, "locate", 0.6),
    (QueryIntent::Navigational, "show me", 0.65),
    (QueryIntent::Exploratory, "why", 0.6),
    (QueryIntent::Exploratory, "explain", 0.65),
    (QueryIntent::Exploratory, "overview of", 0.6),
    (QueryIntent::Factual, "what", 0.6),
    (QueryIntent::Factual, "who", 0.6),
    (QueryIntent::Factual, "when", 0.6),
    (QueryIntent::Factual, "where", 0.6),
];

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("engineering", &["vector", "index", "algorithm", "database", "code", "api", "query"]),
    ("finance", &["price", "cost", "budget", "revenue", "invoice"]),
    ("health", &["symptom", "treatment", "diagnosis", "medication"]),
];

/// Scores every cue against the lowercased query; any cue scoring above
/// `min_secondary_confidence` becomes a secondary intent, the single
/// highest-scoring one becomes primary. Falls back to `Conceptual` at 0.5
/// confidence when nothing matches, mirroring the Analyzer's own fallback.
pub fn classify_intent(query: &str) -> IntentResult {
    let lower = query.to_lowercase();
    let mut scores: HashMap<QueryIntent, f32> = HashMap::new();
    for (intent, cue, confidence) in CUES {
        if lower.contains(cue) {
            let entry = scores.entry(*intent).or_insert(0.0);
            if *confidence > *entry {
                *entry = *confidence;
            }
        }
    }

    if scores.is_empty() {
        scores.insert(QueryIntent::Conceptual, 0.5);
    }

    let mut ranked: Vec<(QueryIntent, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let primary_intent = ranked[0].0;
    let secondary_intents: Vec<QueryIntent> = ranked[1..].iter().map(|(intent, _)| *intent).collect();
    let confidence_by_intent: HashMap<String, f32> =
        ranked.iter().map(|(intent, score)| (format!("{intent:?}"), *score)).collect();

    let domain = classify_domain(&lower);
    let word_count = query.split_whitespace().count();
    let complexity = if word_count > 20 {
        crate::analyzer::QueryComplexity::VeryComplex
    } else if word_count > 8 {
        crate::analyzer::QueryComplexity::Moderate
    } else {
        crate::analyzer::QueryComplexity::Simple
    };

    IntentResult { primary_intent, secondary_intents, confidence_by_intent, domain, complexity }
}

fn classify_domain(lower_query: &str) -> String {
    for (domain, keywords) in DOMAIN_KEYWORDS {
        if keywords.iter().any(|kw| lower_query.contains(kw)) {
            return domain.to_string();
        }
    }
    "general".to_string()
}
