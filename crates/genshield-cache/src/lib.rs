// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity-based response cache.
//!
//! Prompts are canonicalized and hashed for exact lookups. On an exact miss,
//! a bounded sample of stored prompts is scored with a
//! [`SimilarityCalculator`] and the best match above the threshold is served.
//! The cache is a heuristic: a similar prompt is assumed to be good enough,
//! not guaranteed to produce the same image.
//!
//! Entries live in a pluggable [`CacheStore`] so a shared external store can
//! replace the in-process [`MemoryStore`].

pub mod cache;
pub mod canonical;
pub mod similarity;
pub mod store;
pub mod types;

pub use cache::{CacheSettings, SimilarityCache};
pub use canonical::{canonical_hash, canonicalize};
pub use similarity::{BlendedSimilarity, SimilarityCalculator};
pub use store::{CacheStore, MemoryStore};
pub use types::{CacheEntry, CacheFilter, CacheLookup, CacheStats, EntryMetadata, MatchKind};
