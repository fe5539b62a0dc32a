// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the pipeline crates.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default per-request timeout (180s).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Default declared retry budget for a request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a synchronous request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(format!("req_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a background job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(format!("job_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request importance tier. Ordering follows the numeric weight.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Premium,
}

impl Priority {
    /// All tiers, lowest first.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Premium,
    ];

    /// Numeric queue weight of the tier.
    pub const fn weight(self) -> u32 {
        match self {
            Priority::Low => 25,
            Priority::Normal => 50,
            Priority::High => 75,
            Priority::Premium => 100,
        }
    }
}

/// An immutable generation request.
///
/// The payload is opaque to the pipeline; only the envelope fields steer
/// queueing, timeouts, and retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    correlation_id: String,
    payload: serde_json::Value,
    priority: Priority,
    timeout: Duration,
    max_retries: u32,
}

impl GenerationRequest {
    /// Create a request with a fresh correlation id and default envelope.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            payload,
            priority: Priority::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Result returned by the backend.
///
/// Only `success` and the result URL are interpreted; everything else stays
/// in `raw` for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub result_url: Option<String>,
    pub raw: serde_json::Value,
}

impl GenerationResult {
    /// Interpret a raw backend response body.
    ///
    /// A missing `success` flag counts as success when a result URL is present.
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let result_url = ["result_url", "url", "image_url", "imageUrl", "output_url"]
            .iter()
            .find_map(|k| raw.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);
        let success = raw
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(result_url.is_some());
        Self {
            success,
            result_url,
            raw,
        }
    }

    /// Build a successful result around a URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            success: true,
            raw: serde_json::json!({ "success": true, "url": url }),
            result_url: Some(url),
        }
    }
}

/// Health status reported by adapters and derived by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

impl HealthStatus {
    /// Short label (`healthy`, `degraded`, `unhealthy`).
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }
}

/// Outcome of a backend health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: HealthStatus,
    pub latency: Duration,
}

/// Identifies the kind of adapter plugged into the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Backend,
    CacheStore,
    JobTracker,
    Notifier,
}

/// Alert severity. Ordering follows urgency.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

/// A materialized breach of an alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    /// Name of the rule that fired.
    pub rule: String,
    pub metric: String,
    pub severity: Severity,
    /// Aggregate value at evaluation time.
    pub value: f64,
    pub threshold: f64,
    pub comparison: String,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    /// Set once the rule stayed in breach past its escalation delay.
    pub escalated: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}
