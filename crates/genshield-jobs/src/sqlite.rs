// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed job tracker so status survives restarts.
//!
//! All operations go through the single tokio-rusqlite background thread.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use genshield_core::{AdapterType, HealthStatus, JobId, PluginAdapter, ShieldError};
use rusqlite::params;
use tracing::debug;

use crate::model::{JobRecord, JobState};
use crate::tracker::JobStatusTracker;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    finished_at TEXT,
    record TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_user ON jobs(user_id);
CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
";

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ShieldError {
    ShieldError::Storage {
        source: Box::new(e),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode(raw: &str) -> Result<JobRecord, ShieldError> {
    serde_json::from_str(raw).map_err(|e| ShieldError::Storage {
        source: Box::new(e),
    })
}

/// Job tracker persisted in a `jobs` table.
pub struct SqliteJobTracker {
    conn: tokio_rusqlite::Connection,
}

impl SqliteJobTracker {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &str) -> Result<Self, ShieldError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ShieldError::Storage {
                source: Box::new(e),
            })?;
        Self::with_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, ShieldError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| ShieldError::Storage {
                source: Box::new(e),
            })?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: tokio_rusqlite::Connection) -> Result<Self, ShieldError> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        debug!("job tracker schema ready");
        Ok(Self { conn })
    }

    async fn query_records(
        &self,
        sql: String,
        args: Vec<String>,
    ) -> Result<Vec<JobRecord>, ShieldError> {
        let rows: Vec<String> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args), |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;
        rows.iter().map(|raw| decode(raw)).collect()
    }
}

#[async_trait]
impl PluginAdapter for SqliteJobTracker {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::JobTracker
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        let result = self
            .conn
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        Ok(match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl JobStatusTracker for SqliteJobTracker {
    async fn save(&self, record: &JobRecord) -> Result<(), ShieldError> {
        let raw = serde_json::to_string(record).map_err(|e| ShieldError::Storage {
            source: Box::new(e),
        })?;
        let id = record.id.0.clone();
        let user_id = record.user_id.clone();
        let state = record.state.to_string();
        let created_at = timestamp(record.created_at);
        let finished_at = record.finished_at.map(timestamp);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, user_id, state, created_at, finished_at, record) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(id) DO UPDATE SET state = excluded.state, \
                     finished_at = excluded.finished_at, record = excluded.record",
                    params![id, user_id, state, created_at, finished_at, raw],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn load(&self, id: &JobId) -> Result<Option<JobRecord>, ShieldError> {
        let id = id.0.clone();
        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                match conn.query_row(
                    "SELECT record FROM jobs WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                ) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;
        raw.as_deref().map(decode).transpose()
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<JobRecord>, ShieldError> {
        match user_id {
            Some(user) => {
                self.query_records(
                    "SELECT record FROM jobs WHERE user_id = ?1 ORDER BY created_at, id".into(),
                    vec![user.to_string()],
                )
                .await
            }
            None => {
                self.query_records(
                    "SELECT record FROM jobs ORDER BY created_at, id".into(),
                    Vec::new(),
                )
                .await
            }
        }
    }

    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<JobRecord>, ShieldError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=states.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT record FROM jobs WHERE state IN ({}) ORDER BY created_at, id",
            placeholders.join(", ")
        );
        self.query_records(sql, states.iter().map(ToString::to_string).collect())
            .await
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, ShieldError> {
        let cutoff = timestamp(cutoff);
        self.conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM jobs WHERE state IN ('completed', 'failed') \
                     AND finished_at IS NOT NULL AND finished_at < ?1",
                    params![cutoff],
                )?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use genshield_core::{GenerationRequest, GenerationResult, Priority};

    use super::*;

    fn record(user: &str) -> JobRecord {
        JobRecord::new(
            GenerationRequest::new(serde_json::json!({"prompt": user})),
            Some(user.to_string()),
            Priority::Premium,
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let tracker = SqliteJobTracker::open_in_memory().await.unwrap();
        let mut r = record("alice");
        tracker.save(&r).await.unwrap();

        r.attempts = 1;
        r.state = JobState::Completed;
        r.result = Some(GenerationResult::with_url("https://img/1"));
        r.finished_at = Some(Utc::now());
        tracker.save(&r).await.unwrap();

        let loaded = tracker.load(&r.id).await.unwrap().unwrap();
        assert_eq!(loaded, r);
        assert!(tracker.load(&JobId("job_missing".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_user_and_state() {
        let tracker = SqliteJobTracker::open_in_memory().await.unwrap();
        let a = record("alice");
        let mut b = record("bob");
        b.state = JobState::Processing;
        tracker.save(&a).await.unwrap();
        tracker.save(&b).await.unwrap();

        assert_eq!(tracker.list(Some("bob")).await.unwrap(), vec![b.clone()]);
        assert_eq!(tracker.list(None).await.unwrap().len(), 2);
        let active = tracker
            .list_in_states(&[JobState::Processing])
            .await
            .unwrap();
        assert_eq!(active, vec![b]);
    }

    #[tokio::test]
    async fn health_check_is_healthy() {
        let tracker = SqliteJobTracker::open_in_memory().await.unwrap();
        assert_eq!(tracker.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
