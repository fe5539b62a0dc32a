// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use chrono::{Duration, Utc};
use genshield_cache::{
    CacheFilter, CacheSettings, EntryMetadata, MatchKind, MemoryStore, SimilarityCache,
    SimilarityCalculator,
};
use genshield_core::GenerationResult;

fn settings(max_entries: usize) -> CacheSettings {
    CacheSettings {
        max_entries,
        ..CacheSettings::default()
    }
}

fn meta_for(user: &str) -> EntryMetadata {
    EntryMetadata {
        user_id: Some(user.to_string()),
        ..EntryMetadata::default()
    }
}

#[tokio::test]
async fn portrait_paraphrase_hits_and_dragon_misses() {
    let cache = SimilarityCache::in_memory(settings(100));
    cache
        .store(
            "a photorealistic portrait of a smiling woman, studio lighting",
            GenerationResult::with_url("https://cdn.example/portrait.png"),
            EntryMetadata::default(),
        )
        .await
        .unwrap();

    let hit = cache
        .find(
            "photorealistic portrait of smiling woman studio lighting",
            &CacheFilter::default(),
        )
        .await
        .unwrap()
        .expect("paraphrase should hit");
    assert!(hit.similarity >= 0.85);
    assert_eq!(hit.kind, MatchKind::Similar);
    assert_eq!(
        hit.entry.result.result_url.as_deref(),
        Some("https://cdn.example/portrait.png")
    );

    let miss = cache
        .find("a cartoon dragon breathing fire", &CacheFilter::default())
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn eviction_keeps_exactly_max_entries_and_drops_least_recent() {
    let max = 5;
    let k = 3;
    let cache = SimilarityCache::in_memory(settings(max));
    let t0 = Utc::now();

    let prompts: Vec<String> = (0..max + k).map(|i| format!("unique subject number{i}")).collect();
    for (i, prompt) in prompts.iter().enumerate() {
        cache
            .store_at(
                prompt,
                GenerationResult::with_url(format!("https://img/{i}")),
                EntryMetadata::default(),
                t0 + Duration::seconds(i as i64),
            )
            .await
            .unwrap();
    }

    assert_eq!(cache.len().await.unwrap(), max);
    let now = t0 + Duration::seconds(60);
    for (i, prompt) in prompts.iter().enumerate() {
        let found = cache
            .find_at(prompt, &CacheFilter::default(), now)
            .await
            .unwrap()
            .filter(|hit| hit.kind == MatchKind::Exact);
        assert_eq!(found.is_some(), i >= k, "prompt {i}");
    }
    assert_eq!(cache.stats().await.lru_evictions, k as u64);
}

#[tokio::test]
async fn recently_hit_entry_survives_eviction() {
    let cache = SimilarityCache::in_memory(settings(2));
    let t0 = Utc::now();
    let none = CacheFilter::default();
    cache
        .store_at("oldest tower", GenerationResult::with_url("1"), EntryMetadata::default(), t0)
        .await
        .unwrap();
    cache
        .store_at(
            "middle bridge",
            GenerationResult::with_url("2"),
            EntryMetadata::default(),
            t0 + Duration::seconds(1),
        )
        .await
        .unwrap();
    cache
        .find_at("oldest tower", &none, t0 + Duration::seconds(2))
        .await
        .unwrap()
        .unwrap();
    cache
        .store_at(
            "newest harbor",
            GenerationResult::with_url("3"),
            EntryMetadata::default(),
            t0 + Duration::seconds(3),
        )
        .await
        .unwrap();

    let later = t0 + Duration::seconds(4);
    assert!(cache.find_at("oldest tower", &none, later).await.unwrap().is_some());
    assert!(cache.find_at("middle bridge", &none, later).await.unwrap().is_none());
    assert!(cache.find_at("newest harbor", &none, later).await.unwrap().is_some());
}

#[tokio::test]
async fn approximate_matches_respect_filters() {
    let cache = SimilarityCache::in_memory(settings(100));
    cache
        .store(
            "watercolor painting of a lighthouse at sunset",
            GenerationResult::with_url("https://img/alice"),
            meta_for("alice"),
        )
        .await
        .unwrap();

    let paraphrase = "watercolor painting lighthouse at sunset";
    let bob = cache
        .find(paraphrase, &CacheFilter::for_user("bob"))
        .await
        .unwrap();
    assert!(bob.is_none());

    let alice = cache
        .find(paraphrase, &CacheFilter::for_user("alice"))
        .await
        .unwrap();
    assert!(alice.is_some());
}

/// Scores every pair the same so the candidate cap is observable.
struct CountingSimilarity(std::sync::atomic::AtomicUsize);

impl SimilarityCalculator for CountingSimilarity {
    fn similarity(&self, _a: &str, _b: &str) -> f64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        0.0
    }
}

#[tokio::test]
async fn approximate_scan_is_capped() {
    let calc = Arc::new(CountingSimilarity(Default::default()));
    let cache = SimilarityCache::new(
        Arc::new(MemoryStore::new()),
        calc.clone(),
        CacheSettings {
            max_candidates: 10,
            ..CacheSettings::default()
        },
    );
    for i in 0..40 {
        cache
            .store(
                &format!("stored prompt{i}"),
                GenerationResult::with_url("u"),
                EntryMetadata::default(),
            )
            .await
            .unwrap();
    }
    let found = cache
        .find("something else entirely", &CacheFilter::default())
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(calc.0.load(std::sync::atomic::Ordering::SeqCst), 10);
}

#[tokio::test]
async fn miss_does_not_touch_other_entries() {
    let cache = SimilarityCache::in_memory(settings(100));
    let t0 = Utc::now();
    cache
        .store_at("quiet snowy village", GenerationResult::with_url("u"), EntryMetadata::default(), t0)
        .await
        .unwrap();
    cache
        .find_at("loud desert festival", &CacheFilter::default(), t0 + Duration::seconds(5))
        .await
        .unwrap();
    let hit = cache
        .find_at("quiet snowy village", &CacheFilter::default(), t0 + Duration::seconds(6))
        .await
        .unwrap()
        .unwrap();
    // First hit: the earlier miss left the counter alone.
    assert_eq!(hit.entry.stats.hit_count, 1);
}
