// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window aggregation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use crate::sample::{MetricPoint, names};

/// Aggregates an alert rule can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AggregateMetric {
    RequestCount,
    SuccessRate,
    ErrorRate,
    TimeoutRate,
    AvgLatencyMs,
    MedianLatencyMs,
    #[strum(serialize = "p95_latency_ms")]
    #[serde(rename = "p95_latency_ms")]
    P95LatencyMs,
    #[strum(serialize = "p99_latency_ms")]
    #[serde(rename = "p99_latency_ms")]
    P99LatencyMs,
    ThroughputPerMinute,
    CacheHitRate,
    AvgQueueLength,
    PeakQueueLength,
    AvgRetryCount,
}

/// Aggregates over one window. Rates and latencies are `None` when the
/// window saw no operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub generated_at: DateTime<Utc>,
    pub window_secs: u64,
    pub request_count: u64,
    pub success_rate: Option<f64>,
    pub error_rate: Option<f64>,
    pub timeout_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub median_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub throughput_per_minute: f64,
    pub cache_hit_rate: Option<f64>,
    pub avg_queue_length: Option<f64>,
    pub peak_queue_length: Option<f64>,
    pub avg_queue_wait_ms: Option<f64>,
    pub avg_retry_count: Option<f64>,
}

impl PerformanceSnapshot {
    /// Aggregate the points that fall inside `(now - window, now]`.
    pub fn aggregate<'a>(
        points: impl IntoIterator<Item = &'a MetricPoint>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        let since = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut latencies = Vec::new();
        let mut success = Vec::new();
        let mut timeouts = Vec::new();
        let mut retries = Vec::new();
        let mut hits = Vec::new();
        let mut queue_len = Vec::new();
        let mut queue_wait = Vec::new();

        for p in points {
            if p.at <= since || p.at > now {
                continue;
            }
            let bucket = match p.name.as_str() {
                names::REQUEST_DURATION_MS => &mut latencies,
                names::REQUEST_SUCCESS => &mut success,
                names::REQUEST_TIMEOUT => &mut timeouts,
                names::RETRY_COUNT => &mut retries,
                names::CACHE_HIT => &mut hits,
                names::QUEUE_LENGTH => &mut queue_len,
                names::QUEUE_WAIT_MS => &mut queue_wait,
                _ => continue,
            };
            bucket.push(p.value);
        }

        latencies.sort_by(f64::total_cmp);
        let request_count = latencies.len() as u64;
        let success_rate = mean(&success);
        let minutes = (window.as_secs_f64() / 60.0).max(1.0 / 60.0);

        Self {
            generated_at: now,
            window_secs: window.as_secs(),
            request_count,
            success_rate,
            error_rate: success_rate.map(|r| 1.0 - r),
            timeout_rate: mean(&timeouts),
            avg_latency_ms: mean(&latencies),
            median_latency_ms: percentile(&latencies, 50.0),
            p95_latency_ms: percentile(&latencies, 95.0),
            p99_latency_ms: percentile(&latencies, 99.0),
            throughput_per_minute: request_count as f64 / minutes,
            cache_hit_rate: mean(&hits),
            avg_queue_length: mean(&queue_len),
            peak_queue_length: queue_len.iter().copied().reduce(f64::max),
            avg_queue_wait_ms: mean(&queue_wait),
            avg_retry_count: mean(&retries),
        }
    }

    /// Value of `metric`, or `None` when the window has no data for it.
    pub fn value(&self, metric: AggregateMetric) -> Option<f64> {
        match metric {
            AggregateMetric::RequestCount => Some(self.request_count as f64),
            AggregateMetric::SuccessRate => self.success_rate,
            AggregateMetric::ErrorRate => self.error_rate,
            AggregateMetric::TimeoutRate => self.timeout_rate,
            AggregateMetric::AvgLatencyMs => self.avg_latency_ms,
            AggregateMetric::MedianLatencyMs => self.median_latency_ms,
            AggregateMetric::P95LatencyMs => self.p95_latency_ms,
            AggregateMetric::P99LatencyMs => self.p99_latency_ms,
            AggregateMetric::ThroughputPerMinute => Some(self.throughput_per_minute),
            AggregateMetric::CacheHitRate => self.cache_hit_rate,
            AggregateMetric::AvgQueueLength => self.avg_queue_length,
            AggregateMetric::PeakQueueLength => self.peak_queue_length,
            AggregateMetric::AvgRetryCount => self.avg_retry_count,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}
