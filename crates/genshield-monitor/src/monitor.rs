// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process metric buffer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::recording;
use crate::sample::{MetricPoint, OperationSample};
use crate::snapshot::PerformanceSnapshot;

/// Append-only buffer of [`MetricPoint`]s, pruned past a retention horizon.
///
/// Points are kept in arrival order, which is also timestamp order for
/// callers using the wall clock.
#[derive(Debug)]
pub struct PerformanceMonitor {
    points: Mutex<VecDeque<MetricPoint>>,
    window: Duration,
    retention: Duration,
}

impl PerformanceMonitor {
    pub fn new(window: Duration, retention: Duration) -> Self {
        Self {
            points: Mutex::new(VecDeque::new()),
            window,
            retention: retention.max(window),
        }
    }

    pub fn from_config(config: &genshield_config::model::MonitorConfig) -> Self {
        Self::new(config.window(), config.retention())
    }

    fn points(&self) -> MutexGuard<'_, VecDeque<MetricPoint>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Default snapshot window.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn record(&self, point: MetricPoint) {
        self.points().push_back(point);
    }

    pub fn record_operation(&self, sample: &OperationSample) {
        self.record_operation_at(sample, Utc::now());
    }

    pub fn record_operation_at(&self, sample: &OperationSample, at: DateTime<Utc>) {
        recording::record_operation(sample);
        self.points().extend(sample.points(at));
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        self.snapshot_at(Utc::now(), self.window)
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>, window: Duration) -> PerformanceSnapshot {
        PerformanceSnapshot::aggregate(self.points().iter(), now, window)
    }

    /// Drop points older than the retention horizon. Returns how many went.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|r| now.checked_sub_signed(r))
        else {
            return 0;
        };
        let mut points = self.points();
        let before = points.len();
        points.retain(|p| p.at >= cutoff);
        let pruned = before - points.len();
        if pruned > 0 {
            debug!(pruned, remaining = points.len(), "metric points pruned");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(24 * 60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u64, success: bool) -> OperationSample {
        OperationSample {
            duration: Duration::from_millis(ms),
            success,
            ..OperationSample::default()
        }
    }

    #[test]
    fn snapshot_reflects_recorded_operations() {
        let monitor = PerformanceMonitor::default();
        let now = Utc::now();
        monitor.record_operation_at(&sample(100, true), now);
        monitor.record_operation_at(&sample(300, false), now);

        let snap = monitor.snapshot_at(now, Duration::from_secs(60));
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.avg_latency_ms, Some(200.0));
        assert_eq!(snap.error_rate, Some(0.5));
    }

    #[test]
    fn prune_drops_points_past_retention() {
        let monitor = PerformanceMonitor::new(Duration::from_secs(60), Duration::from_secs(3600));
        let now = Utc::now();
        monitor.record_operation_at(&sample(10, true), now - chrono::Duration::hours(2));
        monitor.record_operation_at(&sample(10, true), now);
        let per_op = sample(10, true).points(now).len();

        assert_eq!(monitor.prune_at(now), per_op);
        assert_eq!(monitor.len(), per_op);
    }

    #[test]
    fn retention_never_shorter_than_window() {
        let monitor = PerformanceMonitor::new(Duration::from_secs(600), Duration::from_secs(60));
        let now = Utc::now();
        monitor.record_operation_at(&sample(10, true), now - chrono::Duration::minutes(5));
        assert_eq!(monitor.prune_at(now), 0);
    }
}
