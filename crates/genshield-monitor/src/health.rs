// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline health derived from the current snapshot and active alerts.

use genshield_core::{AlertEvent, HealthStatus, Severity};

use crate::snapshot::PerformanceSnapshot;

/// Error rate above which the pipeline is degraded.
pub const DEGRADED_ERROR_RATE: f64 = 0.10;
/// Error rate above which the pipeline is unhealthy.
pub const UNHEALTHY_ERROR_RATE: f64 = 0.50;
/// p95 latency above which the pipeline is degraded.
pub const DEGRADED_P95_MS: f64 = 60_000.0;

pub fn derive_health(snapshot: &PerformanceSnapshot, active_alerts: &[AlertEvent]) -> HealthStatus {
    let error_rate = snapshot.error_rate.unwrap_or(0.0);

    if let Some(alert) = active_alerts
        .iter()
        .find(|a| a.is_active() && a.severity == Severity::Critical)
    {
        return HealthStatus::Unhealthy(format!("critical alert `{}` active", alert.rule));
    }
    if error_rate > UNHEALTHY_ERROR_RATE {
        return HealthStatus::Unhealthy(format!("error rate {:.0}%", error_rate * 100.0));
    }
    if error_rate > DEGRADED_ERROR_RATE {
        return HealthStatus::Degraded(format!("error rate {:.0}%", error_rate * 100.0));
    }
    if let Some(p95) = snapshot.p95_latency_ms.filter(|p| *p > DEGRADED_P95_MS) {
        return HealthStatus::Degraded(format!("p95 latency {:.0}ms", p95));
    }
    if let Some(alert) = active_alerts.iter().find(|a| a.is_active()) {
        return HealthStatus::Degraded(format!("alert `{}` active", alert.rule));
    }
    HealthStatus::Healthy
}
