// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Performance monitor and alert engine for genshield.
//!
//! [`PerformanceMonitor`] buffers a typed metric point set for every
//! completed operation and aggregates sliding windows into a
//! [`PerformanceSnapshot`]. [`AlertEngine`] evaluates standing rules against
//! those snapshots and dispatches [`AlertEvent`](genshield_core::AlertEvent)s
//! to [`AlertNotifier`](genshield_core::AlertNotifier) channels.
//!
//! Everything is also mirrored to the metrics-rs facade; install
//! [`PrometheusExporter`] to render it in Prometheus text format.

pub mod alert;
pub mod health;
pub mod monitor;
pub mod notify;
pub mod recording;
pub mod sample;
pub mod service;
pub mod snapshot;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use genshield_core::ShieldError;

pub use alert::{AlertEngine, AlertRule, Comparison, Escalation};
pub use health::derive_health;
pub use monitor::PerformanceMonitor;
pub use notify::{ConsoleNotifier, WebhookNotifier};
pub use sample::{MetricCategory, MetricPoint, OperationSample};
pub use service::{MonitorSettings, run_monitor};
pub use snapshot::{AggregateMetric, PerformanceSnapshot};

/// Prometheus recorder handle.
///
/// Installing the recorder is process-global; a second install fails.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    pub fn install() -> Result<Self, ShieldError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ShieldError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}
