//! Semantic Cache component: looks up cached results by embedding similarity
//! rather than exact query-text match.
//!
//! The linear similarity scan is grounded in the example pack's
//! `rank-retrieve/examples/semantic_caching.rs` `SemanticCache` — fine at the
//! scale (`max_entries` in the thousands) this cache is sized for; a cache
//! large enough to need its own ANN index would be a different component.

pub mod memory_backend;

use std::sync::Arc;

use uuid::Uuid;

use crate::adapters::{CacheBackend, Clock};
use crate::config::{CacheConfig, EvictionPolicy};
use crate::error::{RagError, RagResult};
use crate::types::{CacheEntry, CacheResult, Embedding};

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatistics {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct SemanticCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl SemanticCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config, hits: Default::default(), misses: Default::default() }
    }

    /// Best matching entry at or above `similarity_threshold`, capped to
    /// `max_results` cached results, or `None`. Updates hit/miss counters
    /// and, on a hit, the entry's `hit_count` and `last_accessed`. Per
    /// spec.md §4.11, `similarity_score` on the returned `CacheResult` is the
    /// actual cosine similarity to the query, not just a threshold pass/fail.
    pub async fn get(
        &self,
        query_embedding: &Embedding,
        similarity_threshold: f32,
        max_results: usize,
        clock: &dyn Clock,
    ) -> RagResult<Option<CacheResult>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let now = clock.now();
        let all = self.backend.all().await.map_err(RagError::from)?;

        let best = all
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key, entry.query_embedding.cosine_similarity(query_embedding), entry))
            .filter(|(_, similarity, _)| *similarity >= similarity_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((key, similarity_score, mut entry)) => {
                entry.hit_count += 1;
                entry.last_accessed = now;
                self.backend.put(key, entry.clone()).await.map_err(RagError::from)?;
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(Some(CacheResult {
                    original_query: entry.original_query,
                    similarity_score,
                    results: truncate_results(entry.cached_result_payload, max_results),
                    cached_at: entry.created_at,
                    expires_at: entry.expires_at,
                    hit_count: entry.hit_count,
                    last_accessed: entry.last_accessed,
                }))
            }
            None => {
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub async fn has_similar(
        &self,
        query_embedding: &Embedding,
        similarity_threshold: f32,
        clock: &dyn Clock,
    ) -> RagResult<bool> {
        Ok(self.get(query_embedding, similarity_threshold, usize::MAX, clock).await?.is_some())
    }

    /// Up to `n` entries at or above `similarity_threshold`, most similar
    /// first. Unlike `get`, this doesn't count as a cache hit and doesn't
    /// touch `hit_count`/`last_accessed` — it's for callers inspecting the
    /// cache (e.g. a "similar past queries" UI), not serving a result.
    pub async fn find_similar(
        &self,
        query_embedding: &Embedding,
        similarity_threshold: f32,
        n: usize,
    ) -> RagResult<Vec<CacheEntry>> {
        let all = self.backend.all().await.map_err(RagError::from)?;
        let mut scored: Vec<(f32, CacheEntry)> = all
            .into_iter()
            .map(|(_, entry)| (entry.query_embedding.cosine_similarity(query_embedding), entry))
            .filter(|(similarity, _)| *similarity >= similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(n).map(|(_, entry)| entry).collect())
    }

    pub async fn set(
        &self,
        original_query: String,
        query_embedding: Embedding,
        cached_result_payload: serde_json::Value,
        clock: &dyn Clock,
    ) -> RagResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let now = clock.now();
        let expires_at = self.config.ttl_seconds.map(|s| now + chrono::Duration::seconds(s as i64));
        let entry = CacheEntry {
            original_query,
            query_embedding,
            cached_result_payload,
            created_at: now,
            expires_at,
            hit_count: 0,
            last_accessed: now,
        };
        self.backend.put(Uuid::new_v4(), entry).await.map_err(RagError::from)?;
        self.enforce_capacity(now).await
    }

    /// Best-effort pattern invalidation against each entry's original query
    /// text (spec.md §4.11: "semantic staleness is the caller's concern").
    /// `pattern` is matched as a case-insensitive substring, not a regex —
    /// good enough for "drop anything about routers" style cache-busting
    /// without pulling in a pattern-matching dependency this crate has no
    /// other use for.
    pub async fn invalidate(&self, pattern: &str) -> RagResult<u64> {
        let pattern = pattern.to_lowercase();
        let all = self.backend.all().await.map_err(RagError::from)?;
        let mut removed = 0u64;
        for (key, entry) in all {
            if entry.original_query.to_lowercase().contains(&pattern) {
                self.backend.remove(key).await.map_err(RagError::from)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> RagResult<()> {
        self.backend.clear().await.map_err(RagError::from)
    }

    pub async fn statistics(&self) -> RagResult<CacheStatistics> {
        Ok(CacheStatistics {
            entry_count: self.backend.len().await.map_err(RagError::from)?,
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
        })
    }

    /// Drops expired entries, then evicts by policy until at or under
    /// `max_entries`.
    pub async fn optimize(&self, clock: &dyn Clock) -> RagResult<u64> {
        let now = clock.now();
        let mut all = self.backend.all().await.map_err(RagError::from)?;
        let mut removed = 0u64;

        let expired: Vec<Uuid> = all.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| *k).collect();
        for key in &expired {
            self.backend.remove(*key).await.map_err(RagError::from)?;
            removed += 1;
        }
        all.retain(|(k, _)| !expired.contains(k));

        if all.len() > self.config.max_entries {
            let overflow = all.len() - self.config.max_entries;
            tracing::debug!(overflow, policy = ?self.config.eviction_policy, "evicting cache entries over capacity");
            self.sort_for_eviction(&mut all, now);
            for (key, _) in all.into_iter().take(overflow) {
                self.backend.remove(key).await.map_err(RagError::from)?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn enforce_capacity(&self, now: chrono::DateTime<chrono::Utc>) -> RagResult<()> {
        let len = self.backend.len().await.map_err(RagError::from)?;
        if len <= self.config.max_entries {
            return Ok(());
        }
        let mut all = self.backend.all().await.map_err(RagError::from)?;
        self.sort_for_eviction(&mut all, now);
        let overflow = len - self.config.max_entries;
        tracing::debug!(overflow, policy = ?self.config.eviction_policy, "evicting cache entries on insert over capacity");
        for (key, _) in all.into_iter().take(overflow) {
            self.backend.remove(key).await.map_err(RagError::from)?;
        }
        Ok(())
    }

    /// Orders entries worst-first for eviction per the configured policy —
    /// the front of the sorted list is what gets dropped.
    fn sort_for_eviction(&self, entries: &mut [(Uuid, CacheEntry)], now: chrono::DateTime<chrono::Utc>) {
        match self.config.eviction_policy {
            EvictionPolicy::Lru => {
                entries.sort_by_key(|(_, e)| e.last_accessed);
            }
            EvictionPolicy::Lfu => {
                entries.sort_by_key(|(_, e)| e.hit_count);
            }
            EvictionPolicy::Ttl => {
                entries.sort_by_key(|(_, e)| e.expires_at.unwrap_or(e.created_at));
            }
            EvictionPolicy::SimilarityBased => {
                // Without a reference query, "similarity" has nothing to
                // compare against at eviction time; fall back to LRU, same
                // as the teacher's memory system does for its default policy.
                let _ = now;
                entries.sort_by_key(|(_, e)| e.last_accessed);
            }
        }
    }
}

/// Truncates a cached JSON array payload to `max_results` entries. Payloads
/// that aren't arrays (or are already within the cap) pass through unchanged.
fn truncate_results(payload: serde_json::Value, max_results: usize) -> serde_json::Value {
    match payload {
        serde_json::Value::Array(mut items) => {
            items.truncate(max_results);
            serde_json::Value::Array(items)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::test_support::FixedClock;
    use crate::cache::memory_backend::MemoryCacheBackend;
    use chrono::Utc;

    fn clock() -> FixedClock {
        FixedClock::new(Utc::now())
    }

    #[tokio::test]
    async fn exact_embedding_match_is_a_hit() {
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        let clock = clock();
        let embedding = Embedding::new(vec![1.0, 0.0]);
        cache.set("q".to_string(), embedding.clone(), serde_json::json!({"r": 1}), &clock).await.unwrap();
        let threshold = CacheConfig::default().similarity_threshold;
        let hit = cache.get(&embedding, threshold, 10, &clock).await.unwrap();
        let hit = hit.unwrap();
        assert_eq!(hit.similarity_score, 1.0);
        assert_eq!(hit.original_query, "q");
    }

    #[tokio::test]
    async fn dissimilar_embedding_is_a_miss() {
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        let clock = clock();
        cache
            .set("q".to_string(), Embedding::new(vec![1.0, 0.0]), serde_json::json!({}), &clock)
            .await
            .unwrap();
        let threshold = CacheConfig::default().similarity_threshold;
        let miss = cache.get(&Embedding::new(vec![0.0, 1.0]), threshold, 10, &clock).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn get_caps_results_array_at_max_results() {
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        let clock = clock();
        let embedding = Embedding::new(vec![1.0, 0.0]);
        cache.set("q".to_string(), embedding.clone(), serde_json::json!([1, 2, 3, 4]), &clock).await.unwrap();
        let hit = cache.get(&embedding, 0.0, 2, &clock).await.unwrap().unwrap();
        assert_eq!(hit.results, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let mut config = CacheConfig::default();
        config.ttl_seconds = Some(10);
        let threshold = config.similarity_threshold;
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), config);
        let clock = clock();
        let embedding = Embedding::new(vec![1.0, 0.0]);
        cache.set("q".to_string(), embedding.clone(), serde_json::json!({}), &clock).await.unwrap();
        clock.advance(20);
        assert!(cache.get(&embedding, threshold, 10, &clock).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_similar_returns_ranked_matches_without_counting_as_hits() {
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        let clock = clock();
        cache.set("a".to_string(), Embedding::new(vec![1.0, 0.0]), serde_json::json!({}), &clock).await.unwrap();
        cache.set("b".to_string(), Embedding::new(vec![0.9, 0.1]), serde_json::json!({}), &clock).await.unwrap();
        cache.set("c".to_string(), Embedding::new(vec![0.0, 1.0]), serde_json::json!({}), &clock).await.unwrap();

        let matches = cache.find_similar(&Embedding::new(vec![1.0, 0.0]), 0.8, 5).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].original_query, "a");

        let stats = cache.statistics().await.unwrap();
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn invalidate_by_pattern_removes_only_matching_entries() {
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        let clock = clock();
        cache
            .set("how to reset a router".to_string(), Embedding::new(vec![1.0, 0.0]), serde_json::json!({}), &clock)
            .await
            .unwrap();
        cache
            .set("pasta recipes".to_string(), Embedding::new(vec![0.0, 1.0]), serde_json::json!({}), &clock)
            .await
            .unwrap();

        let removed = cache.invalidate("router").await.unwrap();
        assert_eq!(removed, 1);
        let stats = cache.statistics().await.unwrap();
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn capacity_enforcement_evicts_down_to_max_entries() {
        let mut config = CacheConfig::default();
        config.max_entries = 1;
        config.eviction_policy = EvictionPolicy::Lru;
        let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), config);
        let clock = clock();
        cache.set("a".to_string(), Embedding::new(vec![1.0, 0.0]), serde_json::json!({}), &clock).await.unwrap();
        clock.advance(1);
        cache.set("b".to_string(), Embedding::new(vec![0.0, 1.0]), serde_json::json!({}), &clock).await.unwrap();
        let stats = cache.statistics().await.unwrap();
        assert_eq!(stats.entry_count, 1);
    }
}
