// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic aggregation and alert evaluation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alert::AlertEngine;
use crate::monitor::PerformanceMonitor;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// How often a snapshot is logged and old points pruned.
    pub aggregation_interval: Duration,
    pub evaluation_interval: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &genshield_config::model::MonitorConfig) -> Self {
        Self {
            aggregation_interval: Duration::from_secs(config.aggregation_interval_secs.max(1)),
            evaluation_interval: Duration::from_secs(config.evaluation_interval_secs.max(1)),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            aggregation_interval: Duration::from_secs(300),
            evaluation_interval: Duration::from_secs(60),
        }
    }
}

/// Run both monitor ticks until `cancel` fires.
pub async fn run_monitor(
    monitor: Arc<PerformanceMonitor>,
    engine: Arc<AlertEngine>,
    settings: MonitorSettings,
    cancel: CancellationToken,
) {
    let mut aggregate = tokio::time::interval(settings.aggregation_interval);
    aggregate.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut evaluate = tokio::time::interval(settings.evaluation_interval);
    evaluate.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Both intervals complete their first tick immediately.
    aggregate.tick().await;
    evaluate.tick().await;

    info!(
        aggregation_secs = settings.aggregation_interval.as_secs(),
        evaluation_secs = settings.evaluation_interval.as_secs(),
        "performance monitor started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = aggregate.tick() => {
                let now = Utc::now();
                let snap = monitor.snapshot_at(now, monitor.window());
                info!(
                    requests = snap.request_count,
                    error_rate = snap.error_rate.unwrap_or(0.0),
                    p95_ms = snap.p95_latency_ms.unwrap_or(0.0),
                    throughput_per_min = snap.throughput_per_minute,
                    cache_hit_rate = snap.cache_hit_rate.unwrap_or(0.0),
                    "performance snapshot"
                );
                monitor.prune_at(now);
            }
            _ = evaluate.tick() => {
                let fired = engine.evaluate(&monitor).await;
                if !fired.is_empty() {
                    info!(count = fired.len(), "alert evaluation fired events");
                }
            }
        }
    }
    info!("performance monitor stopped");
}
