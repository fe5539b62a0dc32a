// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The similarity cache: exact hash lookup, bounded approximate scan, LRU + TTL eviction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use genshield_core::{GenerationResult, ShieldError};
use metrics::counter;
use tracing::{debug, warn};

use crate::canonical::canonical_hash;
use crate::similarity::{BlendedSimilarity, SimilarityCalculator};
use crate::store::{CacheStore, MemoryStore};
use crate::types::{
    AccessStats, CacheEntry, CacheFilter, CacheLookup, CacheStats, EntryMetadata, MatchKind,
};

/// Tunables for [`SimilarityCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub similarity_threshold: f64,
    pub max_entries: usize,
    pub ttl: Duration,
    /// Upper bound on entries scored per approximate lookup.
    pub max_candidates: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.85,
            max_entries: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
            max_candidates: 50,
        }
    }
}

impl CacheSettings {
    pub fn from_config(config: &genshield_config::model::CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            similarity_threshold: config.similarity_threshold,
            max_entries: config.max_entries.max(1),
            ttl: config.ttl(),
            max_candidates: config.max_candidates.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    lookups: u64,
    exact_hits: u64,
    similar_hits: u64,
    misses: u64,
    stores: u64,
    lru_evictions: u64,
    ttl_evictions: u64,
    corrupted_discards: u64,
    lookup_time: Duration,
}

/// Response cache keyed by canonical prompt hash with approximate matching.
pub struct SimilarityCache {
    store: Arc<dyn CacheStore>,
    calculator: Arc<dyn SimilarityCalculator>,
    settings: CacheSettings,
    counters: Mutex<Counters>,
    access_seq: AtomicU64,
}

impl SimilarityCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        calculator: Arc<dyn SimilarityCalculator>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            calculator,
            settings,
            counters: Mutex::new(Counters::default()),
            access_seq: AtomicU64::new(0),
        }
    }

    /// In-memory cache with the default similarity blend.
    pub fn in_memory(settings: CacheSettings) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(BlendedSimilarity::default()),
            settings,
        )
    }

    pub fn from_config(
        config: &genshield_config::model::CacheConfig,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self::new(
            store,
            Arc::new(BlendedSimilarity::new(config.token_weight, config.keyword_weight)),
            CacheSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn backing_store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn find(
        &self,
        prompt: &str,
        filter: &CacheFilter,
    ) -> Result<Option<CacheLookup>, ShieldError> {
        self.find_at(prompt, filter, Utc::now()).await
    }

    /// Look up `prompt` as of `now`.
    ///
    /// An exact canonical-hash hit passing `filter` wins with similarity 1.0.
    /// Otherwise up to `max_candidates` entries passing `filter` are scored
    /// and the best one at or above the threshold is returned. Only the winner's access stats
    /// change.
    pub async fn find_at(
        &self,
        prompt: &str,
        filter: &CacheFilter,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheLookup>, ShieldError> {
        if !self.settings.enabled {
            return Ok(None);
        }
        let started = Instant::now();
        let hash = canonical_hash(prompt);

        if let Some(entry) = self.load_live(&hash, now).await?
            && filter.matches(&entry.metadata)
        {
            let entry = self.touch(entry, now).await?;
            return Ok(Some(self.hit(entry, 1.0, MatchKind::Exact, started)));
        }

        let mut best: Option<(CacheEntry, f64)> = None;
        let mut scanned = 0usize;
        for key in self.store.keys().await? {
            if scanned >= self.settings.max_candidates {
                break;
            }
            if key == hash {
                continue;
            }
            let Some(candidate) = self.load_live(&key, now).await? else {
                continue;
            };
            if !filter.matches(&candidate.metadata) {
                continue;
            }
            scanned += 1;
            let score = self.calculator.similarity(prompt, &candidate.prompt);
            if score >= self.settings.similarity_threshold
                && best.as_ref().is_none_or(|(_, s)| score > *s)
            {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((entry, score)) => {
                let entry = self.touch(entry, now).await?;
                Ok(Some(self.hit(entry, score, MatchKind::Similar, started)))
            }
            None => {
                self.miss(started, scanned);
                Ok(None)
            }
        }
    }

    pub async fn store(
        &self,
        prompt: &str,
        result: GenerationResult,
        metadata: EntryMetadata,
    ) -> Result<String, ShieldError> {
        self.store_at(prompt, result, metadata, Utc::now()).await
    }

    /// Insert or replace the entry for `prompt`, then evict down to `max_entries`.
    ///
    /// Returns the canonical hash the entry is stored under.
    pub async fn store_at(
        &self,
        prompt: &str,
        result: GenerationResult,
        metadata: EntryMetadata,
        now: DateTime<Utc>,
    ) -> Result<String, ShieldError> {
        let hash = canonical_hash(prompt);
        if !self.settings.enabled {
            return Ok(hash);
        }
        let entry = CacheEntry {
            hash: hash.clone(),
            prompt: prompt.to_string(),
            result,
            metadata,
            stats: AccessStats {
                hit_count: 0,
                created_at: now,
                last_accessed: now,
                access_seq: self.next_seq(),
            },
        };
        self.write(&entry).await?;
        self.counters().stores += 1;
        debug!(hash = %hash, "cache entry stored");

        if self.store.len().await? > self.settings.max_entries {
            self.evict(now).await?;
        }
        Ok(hash)
    }

    /// Drop the entry stored for `prompt`, if any.
    pub async fn invalidate(&self, prompt: &str) -> Result<bool, ShieldError> {
        self.store.delete(&canonical_hash(prompt)).await
    }

    pub async fn purge_expired(&self) -> Result<usize, ShieldError> {
        self.purge_expired_at(Utc::now()).await
    }

    /// Remove every entry whose TTL has elapsed. Returns how many went.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, ShieldError> {
        let mut purged = 0;
        for key in self.store.keys().await? {
            if let Some(entry) = self.load(&key).await?
                && entry.is_expired(now, self.settings.ttl)
            {
                self.store.delete(&key).await?;
                purged += 1;
            }
        }
        if purged > 0 {
            self.counters().ttl_evictions += purged as u64;
            debug!(purged, "expired cache entries purged");
        }
        Ok(purged)
    }

    pub async fn clear(&self) -> Result<(), ShieldError> {
        self.store.clear().await
    }

    pub async fn len(&self) -> Result<usize, ShieldError> {
        self.store.len().await
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.store.len().await.unwrap_or(0);
        let c = self.counters();
        let hits = c.exact_hits + c.similar_hits;
        CacheStats {
            entries,
            lookups: c.lookups,
            exact_hits: c.exact_hits,
            similar_hits: c.similar_hits,
            misses: c.misses,
            hit_rate: if c.lookups == 0 {
                0.0
            } else {
                hits as f64 / c.lookups as f64
            },
            stores: c.stores,
            lru_evictions: c.lru_evictions,
            ttl_evictions: c.ttl_evictions,
            corrupted_discards: c.corrupted_discards,
            avg_lookup_ms: if c.lookups == 0 {
                0.0
            } else {
                c.lookup_time.as_secs_f64() * 1000.0 / c.lookups as f64
            },
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Read and decode an entry. Undecodable entries are deleted and read as absent.
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, ShieldError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                let corruption = ShieldError::CacheCorruption {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %corruption, "discarding corrupted cache entry");
                self.store.delete(key).await?;
                self.counters().corrupted_discards += 1;
                Ok(None)
            }
        }
    }

    /// Like [`load`](Self::load), but expired entries are deleted and read as absent.
    async fn load_live(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, ShieldError> {
        match self.load(key).await? {
            Some(entry) if entry.is_expired(now, self.settings.ttl) => {
                self.store.delete(key).await?;
                self.counters().ttl_evictions += 1;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn write(&self, entry: &CacheEntry) -> Result<(), ShieldError> {
        let raw = serde_json::to_string(entry)
            .map_err(|e| ShieldError::Internal(format!("failed to encode cache entry: {e}")))?;
        self.store.put(&entry.hash, raw).await
    }

    async fn touch(
        &self,
        mut entry: CacheEntry,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, ShieldError> {
        entry.stats.hit_count += 1;
        entry.stats.last_accessed = now;
        entry.stats.access_seq = self.next_seq();
        self.write(&entry).await?;
        Ok(entry)
    }

    /// Remove expired entries, then least-recently-accessed ones until within bounds.
    async fn evict(&self, now: DateTime<Utc>) -> Result<(), ShieldError> {
        let mut live = Vec::new();
        for key in self.store.keys().await? {
            if let Some(entry) = self.load_live(&key, now).await? {
                live.push(entry);
            }
        }
        if live.len() <= self.settings.max_entries {
            return Ok(());
        }

        live.sort_by_key(|e| e.lru_key());
        let excess = live.len() - self.settings.max_entries;
        for entry in live.iter().take(excess) {
            self.store.delete(&entry.hash).await?;
        }
        self.counters().lru_evictions += excess as u64;
        debug!(evicted = excess, "cache evicted least-recently-used entries");
        Ok(())
    }

    fn hit(
        &self,
        entry: CacheEntry,
        similarity: f64,
        kind: MatchKind,
        started: Instant,
    ) -> CacheLookup {
        let elapsed = started.elapsed();
        {
            let mut c = self.counters();
            c.lookups += 1;
            c.lookup_time += elapsed;
            match kind {
                MatchKind::Exact => c.exact_hits += 1,
                MatchKind::Similar => c.similar_hits += 1,
            }
        }
        counter!("genshield_cache_lookups_total", "result" => kind.as_str()).increment(1);
        debug!(hash = %entry.hash, similarity, kind = kind.as_str(), "cache hit");
        CacheLookup {
            entry,
            similarity,
            kind,
            elapsed,
        }
    }

    fn miss(&self, started: Instant, scanned: usize) {
        let elapsed = started.elapsed();
        {
            let mut c = self.counters();
            c.lookups += 1;
            c.misses += 1;
            c.lookup_time += elapsed;
        }
        counter!("genshield_cache_lookups_total", "result" => "miss").increment(1);
        debug!(scanned, "cache miss");
    }
}

impl std::fmt::Debug for SimilarityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityCache")
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> SimilarityCache {
        SimilarityCache::in_memory(CacheSettings::default())
    }

    fn result(url: &str) -> GenerationResult {
        GenerationResult::with_url(url)
    }

    #[tokio::test]
    async fn store_then_find_is_exact() {
        let cache = cache();
        cache
            .store("a misty forest at dawn", result("https://img/1"), EntryMetadata::default())
            .await
            .unwrap();
        let hit = cache
            .find("a misty forest at dawn", &CacheFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.kind, MatchKind::Exact);
        assert_eq!(hit.similarity, 1.0);
        assert_eq!(hit.entry.result.result_url.as_deref(), Some("https://img/1"));
        assert_eq!(hit.entry.stats.hit_count, 1);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = SimilarityCache::in_memory(CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        });
        cache
            .store("x", result("u"), EntryMetadata::default())
            .await
            .unwrap();
        assert!(cache.find("x", &CacheFilter::default()).await.unwrap().is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupted_entry_is_a_silent_miss() {
        let cache = cache();
        let hash = canonical_hash("glass city");
        cache.backing_store().put(&hash, "{not json".into()).await.unwrap();

        let found = cache.find("glass city", &CacheFilter::default()).await.unwrap();
        assert!(found.is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
        assert_eq!(cache.stats().await.corrupted_discards, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_removed_on_read() {
        let cache = cache();
        let t0 = Utc::now();
        cache
            .store_at("old prompt", result("u"), EntryMetadata::default(), t0)
            .await
            .unwrap();
        let later = t0 + chrono::Duration::hours(25);
        assert!(cache
            .find_at("old prompt", &CacheFilter::default(), later)
            .await
            .unwrap()
            .is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
        assert_eq!(cache.stats().await.ttl_evictions, 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let cache = cache();
        let t0 = Utc::now();
        cache
            .store_at("first", result("1"), EntryMetadata::default(), t0)
            .await
            .unwrap();
        cache
            .store_at(
                "second",
                result("2"),
                EntryMetadata::default(),
                t0 + chrono::Duration::hours(12),
            )
            .await
            .unwrap();
        let purged = cache
            .purge_expired_at(t0 + chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache = cache();
        cache
            .store("one", result("1"), EntryMetadata::default())
            .await
            .unwrap();
        cache
            .store("two", result("2"), EntryMetadata::default())
            .await
            .unwrap();
        assert!(cache.invalidate("ONE!").await.unwrap());
        assert!(!cache.invalidate("one").await.unwrap());
        cache.clear().await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = cache();
        cache
            .store("neon street at night", result("u"), EntryMetadata::default())
            .await
            .unwrap();
        let none = CacheFilter::default();
        cache.find("neon street at night", &none).await.unwrap();
        cache.find("a bowl of fruit", &none).await.unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }
}
