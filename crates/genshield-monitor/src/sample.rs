// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw metric points and the per-operation sample they are derived from.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Point names written by [`OperationSample::points`].
pub mod names {
    pub const REQUEST_DURATION_MS: &str = "request_duration_ms";
    pub const REQUEST_SUCCESS: &str = "request_success";
    pub const REQUEST_TIMEOUT: &str = "request_timeout";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const CACHE_HIT: &str = "cache_hit";
    pub const QUEUE_WAIT_MS: &str = "queue_wait_ms";
    pub const QUEUE_LENGTH: &str = "queue_length";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Usage,
    Performance,
    Quality,
}

/// One append-only measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub at: DateTime<Utc>,
    pub category: MetricCategory,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn new(
        at: DateTime<Utc>,
        category: MetricCategory,
        name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            at,
            category,
            name: name.into(),
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// What one completed operation looked like.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationSample {
    pub duration: Duration,
    pub success: bool,
    pub timed_out: bool,
    pub retry_count: u32,
    pub cache_hit: bool,
    pub queue_wait: Duration,
    /// Client queue length observed when the operation finished.
    pub queue_length: usize,
}

impl OperationSample {
    /// Expand into the typed points the monitor stores.
    pub fn points(&self, at: DateTime<Utc>) -> Vec<MetricPoint> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let outcome = if self.success { "success" } else { "error" };
        vec![
            MetricPoint::new(
                at,
                MetricCategory::Performance,
                names::REQUEST_DURATION_MS,
                self.duration.as_micros() as f64 / 1000.0,
            )
            .with_tag("outcome", outcome),
            MetricPoint::new(at, MetricCategory::Quality, names::REQUEST_SUCCESS, flag(self.success)),
            MetricPoint::new(at, MetricCategory::Quality, names::REQUEST_TIMEOUT, flag(self.timed_out)),
            MetricPoint::new(
                at,
                MetricCategory::Quality,
                names::RETRY_COUNT,
                f64::from(self.retry_count),
            ),
            MetricPoint::new(at, MetricCategory::Usage, names::CACHE_HIT, flag(self.cache_hit)),
            MetricPoint::new(
                at,
                MetricCategory::Performance,
                names::QUEUE_WAIT_MS,
                self.queue_wait.as_micros() as f64 / 1000.0,
            ),
            MetricPoint::new(
                at,
                MetricCategory::Usage,
                names::QUEUE_LENGTH,
                self.queue_length as f64,
            ),
        ]
    }
}
