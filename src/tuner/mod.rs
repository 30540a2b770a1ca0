//! ANN Auto-Tuner component: sweeps HNSW parameters and picks a
//! configuration that trades recall for latency according to a `Profile`.
//!
//! The sweep-then-Pareto-refine-then-validate shape is grounded in the
//! example pack's `rank-retrieve/examples/factory_and_autotune.rs`
//! (`ParameterTuner`, `Criterion::{RecallAtK, Balanced}`), adapted to this
//! crate's hand-rolled HNSW instead of a delegated index factory.

use std::time::Instant;

use uuid::Uuid;

use crate::adapters::Random;
use crate::config::{HnswConfig, TunerProfile};
use crate::vector_store::hnsw::HnswBuilder;

#[derive(Debug, Clone, Copy)]
pub struct BenchmarkResult {
    pub config: HnswConfigSnapshot,
    pub recall_at_k: f32,
    pub latency_p95_ms: f32,
}

/// Plain-data mirror of `HnswConfig` so benchmark results stay `Copy` and
/// comparable without dragging the config type's serde derives along.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswConfigSnapshot {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl From<&HnswConfig> for HnswConfigSnapshot {
    fn from(config: &HnswConfig) -> Self {
        Self { m: config.m, ef_construction: config.ef_construction, ef_search: config.ef_search }
    }
}

pub struct GoldenQuery {
    pub vector: Vec<f32>,
    pub expected_top_k: Vec<Uuid>,
}

pub struct AnnTuner<'a> {
    random: &'a dyn Random,
}

impl<'a> AnnTuner<'a> {
    pub fn new(random: &'a dyn Random) -> Self {
        Self { random }
    }

    /// Builds a graph under `config` and measures recall@k and p95 query
    /// latency against `golden_set`, using each query's own
    /// `expected_top_k` as ground truth (assumed pre-computed by brute
    /// force, not derived here, so the benchmark doesn't validate against
    /// itself).
    pub fn benchmark(
        &self,
        dataset: Vec<(Uuid, Vec<f32>)>,
        golden_set: &[GoldenQuery],
        config: HnswConfig,
        k: usize,
    ) -> BenchmarkResult {
        let exact_threshold = config.exact_search_threshold;
        let builder = HnswBuilder::new(config.clone(), self.random);
        let graph = builder.build(dataset);
        let _ = exact_threshold;

        let mut recalls = Vec::with_capacity(golden_set.len());
        let mut latencies = Vec::with_capacity(golden_set.len());

        for query in golden_set {
            let start = Instant::now();
            let results = graph.search(&query.vector, k, Some(config.ef_search));
            latencies.push(start.elapsed().as_secs_f32() * 1000.0);

            if query.expected_top_k.is_empty() {
                continue;
            }
            let found: std::collections::HashSet<Uuid> = results.iter().map(|(id, _)| *id).collect();
            let hits = query.expected_top_k.iter().filter(|id| found.contains(id)).count();
            recalls.push(hits as f32 / query.expected_top_k.len() as f32);
        }

        let recall_at_k = mean(&recalls);
        let latency_p95_ms = percentile(&mut latencies, 0.95);

        BenchmarkResult { config: HnswConfigSnapshot::from(&config), recall_at_k, latency_p95_ms }
    }

    pub fn benchmark_sweep(
        &self,
        dataset: Vec<(Uuid, Vec<f32>)>,
        golden_set: &[GoldenQuery],
        candidates: Vec<HnswConfig>,
        k: usize,
    ) -> Vec<BenchmarkResult> {
        candidates
            .into_iter()
            .map(|config| self.benchmark(dataset.clone(), golden_set, config, k))
            .collect()
    }

    /// Coarse grid around the base config, covering both directions on `m`
    /// and `ef_search` — the two parameters with the clearest recall/latency
    /// tradeoff.
    fn coarse_grid(&self, base: &HnswConfig) -> Vec<HnswConfig> {
        let mut grid = Vec::new();
        for &m in &[base.m / 2, base.m, base.m * 2] {
            for &ef_search in &[base.ef_search / 2, base.ef_search, base.ef_search * 2] {
                if m == 0 || ef_search == 0 {
                    continue;
                }
                grid.push(HnswConfig {
                    m,
                    ef_construction: base.ef_construction,
                    ef_search: ef_search.max(m),
                    exact_search_threshold: base.exact_search_threshold,
                });
            }
        }
        grid
    }

    /// Non-dominated set: a config is kept only if no other config has both
    /// >= recall and <= latency (strictly better in at least one).
    fn pareto_frontier(results: Vec<BenchmarkResult>) -> Vec<BenchmarkResult> {
        results
            .iter()
            .filter(|candidate| {
                !results.iter().any(|other| {
                    other.recall_at_k >= candidate.recall_at_k
                        && other.latency_p95_ms <= candidate.latency_p95_ms
                        && (other.recall_at_k > candidate.recall_at_k || other.latency_p95_ms < candidate.latency_p95_ms)
                })
            })
            .copied()
            .collect()
    }

    fn select_by_profile(frontier: &[BenchmarkResult], profile: TunerProfile) -> BenchmarkResult {
        match profile {
            TunerProfile::Speed => frontier
                .iter()
                .min_by(|a, b| a.latency_p95_ms.partial_cmp(&b.latency_p95_ms).unwrap())
                .copied(),
            TunerProfile::Accuracy => frontier
                .iter()
                .max_by(|a, b| a.recall_at_k.partial_cmp(&b.recall_at_k).unwrap())
                .copied(),
            TunerProfile::Memory => frontier.iter().min_by_key(|r| r.config.m).copied(),
            TunerProfile::Balanced => frontier
                .iter()
                .max_by(|a, b| {
                    let score = |r: &BenchmarkResult| r.recall_at_k - r.latency_p95_ms / 1000.0;
                    score(a).partial_cmp(&score(b)).unwrap()
                })
                .copied(),
        }
        .expect("frontier is never empty: at least the base candidate survives")
    }

    /// Three stages: coarse grid sweep, Pareto-frontier refine, then a
    /// regression guard against `baseline` — a candidate whose recall falls
    /// more than `max_recall_regression` below the baseline's is rejected
    /// even if it otherwise wins on the chosen profile.
    pub fn auto_tune(
        &self,
        dataset: Vec<(Uuid, Vec<f32>)>,
        golden_set: &[GoldenQuery],
        base_config: &HnswConfig,
        profile: TunerProfile,
        baseline: Option<BenchmarkResult>,
        max_recall_regression: f32,
        k: usize,
    ) -> HnswConfigSnapshot {
        let grid = self.coarse_grid(base_config);
        let results = self.benchmark_sweep(dataset, golden_set, grid, k);
        let frontier = Self::pareto_frontier(results);
        let chosen = Self::select_by_profile(&frontier, profile);

        match baseline {
            Some(baseline) if chosen.recall_at_k + max_recall_regression < baseline.recall_at_k => {
                tracing::warn!(
                    chosen_recall = chosen.recall_at_k,
                    baseline_recall = baseline.recall_at_k,
                    "auto-tune candidate regressed recall past the guard, keeping baseline config"
                );
                baseline.config
            }
            _ => chosen.config,
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn percentile(values: &mut [f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((values.len() as f32 - 1.0) * p).round() as usize;
    values[idx.min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::test_support::ScriptedRandom;

    fn dataset(n: usize) -> Vec<(Uuid, Vec<f32>)> {
        (0..n).map(|i| (Uuid::new_v4(), vec![i as f32, (n - i) as f32])).collect()
    }

    #[test]
    fn benchmark_computes_recall_against_golden_set() {
        let random = ScriptedRandom::new(vec![0.9, 0.8, 0.7]);
        let tuner = AnnTuner::new(&random);
        let data = dataset(20);
        let target = data[5].clone();
        let golden = vec![GoldenQuery { vector: target.1.clone(), expected_top_k: vec![target.0] }];
        let config = HnswConfig { exact_search_threshold: 100, ..Default::default() };
        let result = tuner.benchmark(data, &golden, config, 1);
        assert_eq!(result.recall_at_k, 1.0);
    }

    #[test]
    fn auto_tune_respects_recall_regression_guard() {
        let random = ScriptedRandom::new(vec![0.9, 0.8, 0.7, 0.6]);
        let tuner = AnnTuner::new(&random);
        let data = dataset(30);
        let golden: Vec<GoldenQuery> =
            data.iter().take(5).map(|(id, v)| GoldenQuery { vector: v.clone(), expected_top_k: vec![*id] }).collect();
        let base = HnswConfig { exact_search_threshold: 1000, ..Default::default() };
        let baseline = BenchmarkResult {
            config: HnswConfigSnapshot::from(&base),
            recall_at_k: 0.99,
            latency_p95_ms: 1.0,
        };
        let chosen = tuner.auto_tune(data, &golden, &base, TunerProfile::Speed, Some(baseline), 0.01, 1);
        // exact-search path (threshold above dataset size) always recalls
        // perfectly, so the guard should never need to fall back here; this
        // asserts the guard doesn't spuriously reject a passing candidate.
        assert_eq!(chosen.m, base.m);
    }
}
