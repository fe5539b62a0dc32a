// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache entry and lookup types.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use genshield_core::GenerationResult;
use serde::{Deserialize, Serialize};

/// Where a stored result came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub user_id: Option<String>,
    pub preset_id: Option<String>,
    /// Backend time spent producing the result.
    pub processing_time_ms: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Access bookkeeping, updated on every hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessStats {
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Breaks ties between entries touched within the same instant.
    pub access_seq: u64,
}

/// One cached generation, keyed by the canonical hash of its prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub prompt: String,
    pub result: GenerationResult,
    pub metadata: EntryMetadata,
    pub stats: AccessStats,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.stats.created_at) >= ttl
    }

    pub(crate) fn lru_key(&self) -> (DateTime<Utc>, u64) {
        (self.stats.last_accessed, self.stats.access_seq)
    }
}

/// Restricts approximate matches to entries with the same origin.
///
/// Every field that is set must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheFilter {
    pub user_id: Option<String>,
    pub preset_id: Option<String>,
    pub tags: BTreeSet<String>,
}

impl CacheFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_preset(mut self, preset_id: impl Into<String>) -> Self {
        self.preset_id = Some(preset_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        let user_ok = self
            .user_id
            .as_ref()
            .is_none_or(|u| metadata.user_id.as_ref() == Some(u));
        let preset_ok = self
            .preset_id
            .as_ref()
            .is_none_or(|p| metadata.preset_id.as_ref() == Some(p));
        user_ok && preset_ok && self.tags.is_subset(&metadata.tags)
    }
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub entry: CacheEntry,
    pub similarity: f64,
    pub kind: MatchKind,
    pub elapsed: Duration,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub lookups: u64,
    pub exact_hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub stores: u64,
    pub lru_evictions: u64,
    pub ttl_evictions: u64,
    pub corrupted_discards: u64,
    pub avg_lookup_ms: f64,
}

/// How a hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Similar,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Similar => "similar",
        }
    }
}
