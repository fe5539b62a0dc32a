// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value backing store for cache entries.
//!
//! Entries are stored as serialized JSON text so the cache can sit on top of
//! any external store that holds strings.

use std::collections::HashMap;

use async_trait::async_trait;
use genshield_core::{AdapterType, HealthStatus, PluginAdapter, ShieldError};
use tokio::sync::Mutex;

/// Storage seam for the similarity cache.
#[async_trait]
pub trait CacheStore: PluginAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, ShieldError>;

    /// Insert or replace a value.
    async fn put(&self, key: &str, value: String) -> Result<(), ShieldError>;

    /// Remove a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, ShieldError>;

    /// All keys, most recently written first.
    async fn keys(&self) -> Result<Vec<String>, ShieldError>;

    async fn len(&self) -> Result<usize, ShieldError>;

    async fn clear(&self) -> Result<(), ShieldError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, (u64, String)>,
    next_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CacheStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ShieldError> {
        Ok(self.inner.lock().await.values.get(key).map(|(_, v)| v.clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), ShieldError> {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.values.insert(key.to_string(), (seq, value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ShieldError> {
        Ok(self.inner.lock().await.values.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, ShieldError> {
        let inner = self.inner.lock().await;
        let mut keyed: Vec<(u64, &String)> =
            inner.values.iter().map(|(k, (seq, _))| (*seq, k)).collect();
        keyed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        Ok(keyed.into_iter().map(|(_, k)| k.clone()).collect())
    }

    async fn len(&self) -> Result<usize, ShieldError> {
        Ok(self.inner.lock().await.values.len())
    }

    async fn clear(&self) -> Result<(), ShieldError> {
        self.inner.lock().await.values.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_are_newest_first() {
        let store = MemoryStore::new();
        store.put("a", "1".into()).await.unwrap();
        store.put("b", "2".into()).await.unwrap();
        store.put("a", "3".into()).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.put("k", "v".into()).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
