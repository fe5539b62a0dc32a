// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job status persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genshield_core::{AdapterType, HealthStatus, JobId, PluginAdapter, ShieldError};
use tokio::sync::RwLock;

use crate::model::{JobRecord, JobState};

/// Stores job records for status polling and restart recovery.
#[async_trait]
pub trait JobStatusTracker: PluginAdapter {
    /// Insert or replace a record.
    async fn save(&self, record: &JobRecord) -> Result<(), ShieldError>;

    async fn load(&self, id: &JobId) -> Result<Option<JobRecord>, ShieldError>;

    /// Records, oldest first, optionally limited to one user.
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<JobRecord>, ShieldError>;

    /// Records in any of the given states, oldest first.
    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ShieldError>;

    /// Delete terminal records that finished before `cutoff`. Returns how many.
    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, ShieldError>;
}

/// Process-local tracker.
#[derive(Debug, Default)]
pub struct MemoryJobTracker {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(mut records: Vec<JobRecord>) -> Vec<JobRecord> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

#[async_trait]
impl PluginAdapter for MemoryJobTracker {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::JobTracker
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl JobStatusTracker for MemoryJobTracker {
    async fn save(&self, record: &JobRecord) -> Result<(), ShieldError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, id: &JobId) -> Result<Option<JobRecord>, ShieldError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<JobRecord>, ShieldError> {
        let records = self.records.read().await;
        Ok(oldest_first(
            records
                .values()
                .filter(|r| user_id.is_none_or(|u| r.user_id.as_deref() == Some(u)))
                .cloned()
                .collect(),
        ))
    }

    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ShieldError> {
        let records = self.records.read().await;
        Ok(oldest_first(
            records
                .values()
                .filter(|r| states.contains(&r.state))
                .cloned()
                .collect(),
        ))
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, ShieldError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            !(r.state.is_terminal() && r.finished_at.is_some_and(|at| at < cutoff))
        });
        Ok(before - records.len())
    }
}
