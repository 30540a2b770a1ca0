//! Hybrid Search / Fusion component: combines dense and sparse result lists
//! into one ranking.
//!
//! Grounded in the teacher's `search/hybrid.rs` (`reciprocal_rank_fusion`,
//! `score_aware_rrf`), generalized to the full strategy set named in
//! spec.md §4.7: Reciprocal Rank Fusion, Weighted Sum, Product, Harmonic
//! Mean, and Maximum. The `Auto strategy` toggle is a weight override, not a
//! sixth method — see `fuse` below.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::{FusionStrategy, HybridConfig};
use crate::types::HasIdAndScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridSource {
    Vector,
    Sparse,
    Both,
}

#[derive(Debug, Clone)]
pub struct HybridResult {
    pub id: Uuid,
    pub vector_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
    pub vector_score: Option<f32>,
    pub sparse_score: Option<f32>,
    pub fused_score: f32,
    /// Query terms found in this chunk's indexed text. Populated by the
    /// caller from the Sparse Index (empty for vector-only hits) — `fuse`
    /// itself only ever sees scores, not text.
    pub matched_terms: Vec<String>,
    pub source: HybridSource,
}

impl HasIdAndScore for HybridResult {
    fn id(&self) -> Uuid {
        self.id
    }

    fn score(&self) -> f32 {
        self.fused_score
    }
}

/// Per-list rank and score, keyed by id, used as the common shape both fusion
/// formulas read from.
fn rank_and_score(results: &[(Uuid, f32)]) -> HashMap<Uuid, (usize, f32)> {
    results.iter().enumerate().map(|(rank, (id, score))| (*id, (rank + 1, *score))).collect()
}

fn source_of(vector_present: bool, sparse_present: bool) -> HybridSource {
    match (vector_present, sparse_present) {
        (true, true) => HybridSource::Both,
        (true, false) => HybridSource::Vector,
        (false, true) => HybridSource::Sparse,
        (false, false) => unreachable!("id came from one of the two maps"),
    }
}

/// `RRF(d) = sum_s w_s * 1 / (k + rank_s(d))`. Ranks, not raw scores, are
/// fused — makes the formula invariant to the two lists using different
/// score scales (cosine similarity vs. BM25). Output is sorted by
/// `fused_score` desc, ties broken by ascending id for a stable order.
pub fn reciprocal_rank_fusion(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
) -> Vec<HybridResult> {
    let vector_ranks = rank_and_score(vector_results);
    let sparse_ranks = rank_and_score(sparse_results);

    let mut ids: Vec<Uuid> = vector_ranks.keys().chain(sparse_ranks.keys()).copied().collect();
    ids.sort();
    ids.dedup();

    let mut results: Vec<HybridResult> = ids
        .into_iter()
        .map(|id| {
            let vector_entry = vector_ranks.get(&id);
            let sparse_entry = sparse_ranks.get(&id);
            let vector_term = vector_entry
                .map(|(rank, _)| config.vector_weight / (config.rrf_k + *rank as f32))
                .unwrap_or(0.0);
            let sparse_term = sparse_entry
                .map(|(rank, _)| config.sparse_weight / (config.rrf_k + *rank as f32))
                .unwrap_or(0.0);
            HybridResult {
                id,
                vector_rank: vector_entry.map(|(rank, _)| *rank),
                sparse_rank: sparse_entry.map(|(rank, _)| *rank),
                vector_score: vector_entry.map(|(_, s)| *s),
                sparse_score: sparse_entry.map(|(_, s)| *s),
                fused_score: vector_term + sparse_term,
                matched_terms: Vec::new(),
                source: source_of(vector_entry.is_some(), sparse_entry.is_some()),
            }
        })
        .collect();

    sort_stable(&mut results);
    results
}

/// Normalizes each list's raw scores to `[0, 1]` via min-max, then combines
/// with the configured weights. Unlike RRF this is sensitive to score
/// distribution, so it's only used when the caller has reason to trust both
/// scales are comparable post-normalization.
fn normalize(results: &[(Uuid, f32)]) -> HashMap<Uuid, f32> {
    if results.is_empty() {
        return HashMap::new();
    }
    let max = results.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
    let min = results.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
    let range = (max - min).max(1e-6);
    results.iter().map(|(id, score)| (*id, (score - min) / range)).collect()
}

fn fuse_normalized(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
    combine: impl Fn(f32, f32, f32, f32) -> f32,
) -> Vec<HybridResult> {
    let vector_ranks = rank_and_score(vector_results);
    let sparse_ranks = rank_and_score(sparse_results);
    let vector_norm = normalize(vector_results);
    let sparse_norm = normalize(sparse_results);

    let mut ids: Vec<Uuid> = vector_norm.keys().chain(sparse_norm.keys()).copied().collect();
    ids.sort();
    ids.dedup();

    let mut results: Vec<HybridResult> = ids
        .into_iter()
        .map(|id| {
            let vector_entry = vector_ranks.get(&id);
            let sparse_entry = sparse_ranks.get(&id);
            let v = vector_norm.get(&id).copied().unwrap_or(0.0);
            let s = sparse_norm.get(&id).copied().unwrap_or(0.0);
            HybridResult {
                id,
                vector_rank: vector_entry.map(|(rank, _)| *rank),
                sparse_rank: sparse_entry.map(|(rank, _)| *rank),
                vector_score: vector_entry.map(|(_, score)| *score),
                sparse_score: sparse_entry.map(|(_, score)| *score),
                fused_score: combine(v, s, config.vector_weight, config.sparse_weight),
                matched_terms: Vec::new(),
                source: source_of(vector_entry.is_some(), sparse_entry.is_some()),
            }
        })
        .collect();

    sort_stable(&mut results);
    results
}

fn sort_stable(results: &mut [HybridResult]) {
    results.sort_by(|a, b| {
        b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id))
    });
}

/// Only documents present in both sources contribute (spec.md §4.7:
/// "Product / HarmonicMean. Only documents present in both sources
/// contribute.").
fn both_sources_only(results: Vec<HybridResult>) -> Vec<HybridResult> {
    results.into_iter().filter(|r| r.source == HybridSource::Both).collect()
}

pub fn weighted_sum_fusion(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
) -> Vec<HybridResult> {
    fuse_normalized(vector_results, sparse_results, config, |v, s, wv, ws| v * wv + s * ws)
}

pub fn product_fusion(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
) -> Vec<HybridResult> {
    both_sources_only(fuse_normalized(vector_results, sparse_results, config, |v, s, wv, ws| {
        (v.max(1e-3).powf(wv)) * (s.max(1e-3).powf(ws))
    }))
}

pub fn harmonic_mean_fusion(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
) -> Vec<HybridResult> {
    both_sources_only(fuse_normalized(vector_results, sparse_results, config, |v, s, _, _| {
        if v + s <= 1e-6 {
            0.0
        } else {
            2.0 * v * s / (v + s)
        }
    }))
}

pub fn maximum_fusion(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    config: &HybridConfig,
) -> Vec<HybridResult> {
    fuse_normalized(vector_results, sparse_results, config, |v, s, _, _| v.max(s))
}

/// Query-length weight buckets for the Auto strategy (spec.md §4.7): the
/// fusion *method* stays whatever `config.strategy` names; only the
/// vector/sparse weight balance shifts toward sparse for very short queries
/// and toward vector for longer, more descriptive ones.
fn auto_weights(query_word_count: usize) -> (f32, f32) {
    match query_word_count {
        0..=2 => (0.3, 0.7),
        3..=5 => (0.6, 0.4),
        _ => (0.8, 0.2),
    }
}

/// Dispatches to the configured fusion method, first applying the Auto
/// strategy's weight override (if enabled) per spec.md §4.7. Auto never
/// changes which fusion method runs — only `vector_weight`/`sparse_weight`.
pub fn fuse(
    vector_results: &[(Uuid, f32)],
    sparse_results: &[(Uuid, f32)],
    query_word_count: usize,
    config: &HybridConfig,
) -> Vec<HybridResult> {
    let mut effective = config.clone();
    if config.auto_strategy.enabled {
        let (vector_weight, sparse_weight) = auto_weights(query_word_count);
        effective.vector_weight = vector_weight;
        effective.sparse_weight = sparse_weight;
    }

    match effective.strategy {
        FusionStrategy::ReciprocalRank => reciprocal_rank_fusion(vector_results, sparse_results, &effective),
        FusionStrategy::WeightedSum => weighted_sum_fusion(vector_results, sparse_results, &effective),
        FusionStrategy::Product => product_fusion(vector_results, sparse_results, &effective),
        FusionStrategy::HarmonicMean => harmonic_mean_fusion(vector_results, sparse_results, &effective),
        FusionStrategy::Maximum => maximum_fusion(vector_results, sparse_results, &effective),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_ranks_overlap_above_either_alone() {
        let shared = Uuid::new_v4();
        let vector_only = Uuid::new_v4();
        let vector_results = vec![(shared, 0.9), (vector_only, 0.8)];
        let sparse_results = vec![(shared, 5.0)];
        let config = HybridConfig::default();
        let results = reciprocal_rank_fusion(&vector_results, &sparse_results, &config);
        assert_eq!(results[0].id, shared);
        assert_eq!(results[0].source, HybridSource::Both);
        assert_eq!(results[0].vector_rank, Some(1));
        assert_eq!(results[0].sparse_rank, Some(1));
    }

    /// S3 from spec.md §8: vector ranks [A, B, C], sparse ranks [C, A, D],
    /// default weights (0.7/0.3) and k=60 fuse to the order A, C, B, D.
    #[test]
    fn s3_rrf_fixture_matches_expected_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        let vector_results = vec![(a, 0.9), (b, 0.8), (c, 0.7)];
        let sparse_results = vec![(c, 5.0), (a, 4.0), (d, 3.0)];
        let config = HybridConfig { auto_strategy: crate::config::AutoStrategyConfig { enabled: false }, ..Default::default() };

        let results = reciprocal_rank_fusion(&vector_results, &sparse_results, &config);
        let order: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![a, c, b, d]);
    }

    #[test]
    fn fuse_auto_overrides_weights_but_keeps_configured_method() {
        let a = Uuid::new_v4();
        let config = HybridConfig { strategy: FusionStrategy::WeightedSum, ..Default::default() };
        let results = fuse(&[(a, 0.9)], &[], 2, &config);
        assert_eq!(results.len(), 1);
        // WeightedSum with a single vector-only hit normalizes to 1.0, scaled
        // by the short-query vector weight override (0.3).
        assert!((results[0].fused_score - 0.3).abs() < 1e-5);
    }

    #[test]
    fn fuse_with_auto_disabled_uses_configured_weights_unchanged() {
        let a = Uuid::new_v4();
        let config = HybridConfig {
            strategy: FusionStrategy::WeightedSum,
            auto_strategy: crate::config::AutoStrategyConfig { enabled: false },
            ..Default::default()
        };
        let results = fuse(&[(a, 0.9)], &[], 2, &config);
        assert!((results[0].fused_score - config.vector_weight).abs() < 1e-5);
    }

    #[test]
    fn weighted_sum_normalizes_before_combining() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let config = HybridConfig {
            strategy: FusionStrategy::WeightedSum,
            auto_strategy: crate::config::AutoStrategyConfig { enabled: false },
            ..Default::default()
        };
        let results = weighted_sum_fusion(&[(a, 10.0), (b, 0.0)], &[], &config);
        assert_eq!(results[0].id, a);
        assert!((results[0].fused_score - config.vector_weight).abs() < 1e-5);
    }

    #[test]
    fn harmonic_mean_excludes_results_missing_from_either_source() {
        let a = Uuid::new_v4();
        let config = HybridConfig { strategy: FusionStrategy::HarmonicMean, ..Default::default() };
        let results = harmonic_mean_fusion(&[(a, 1.0)], &[], &config);
        assert!(results.is_empty());
    }
}
