// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use genshield_core::Severity;
use genshield_monitor::{
    AggregateMetric, AlertEngine, AlertRule, Comparison, Escalation, OperationSample,
    PerformanceMonitor, derive_health,
};
use genshield_test_utils::RecordingNotifier;

fn slow_op(monitor: &PerformanceMonitor, at: DateTime<Utc>, ms: u64) {
    monitor.record_operation_at(
        &OperationSample {
            duration: Duration::from_millis(ms),
            success: true,
            ..OperationSample::default()
        },
        at,
    );
}

fn latency_rule() -> AlertRule {
    AlertRule::new(
        "slow_responses",
        AggregateMetric::P95LatencyMs,
        Comparison::Gt,
        1_000.0,
    )
    .with_window(Duration::from_secs(60))
    .with_cooldown(Duration::from_secs(30 * 60))
    .with_channels(&["console"])
    .with_escalation(Escalation {
        after: Duration::from_secs(5 * 60),
        severity: Severity::Critical,
        channels: vec!["webhook".into()],
    })
}

#[tokio::test]
async fn events_reach_rule_channels_and_escalation_adds_more() {
    let console = Arc::new(RecordingNotifier::new("console"));
    let webhook = Arc::new(RecordingNotifier::new("webhook"));
    let engine = AlertEngine::new(vec![latency_rule()])
        .with_notifier(console.clone())
        .with_notifier(webhook.clone());
    let monitor = PerformanceMonitor::default();
    let t0 = Utc::now();

    slow_op(&monitor, t0, 5_000);
    engine.evaluate_at(&monitor, t0).await;
    assert_eq!(console.events().len(), 1);
    assert!(webhook.events().is_empty());

    let t5 = t0 + chrono::Duration::minutes(5);
    slow_op(&monitor, t5, 5_000);
    engine.evaluate_at(&monitor, t5).await;

    let console_events = console.events();
    assert_eq!(console_events.len(), 2);
    assert_eq!(console_events[1].severity, Severity::Critical);
    let webhook_events = webhook.events();
    assert_eq!(webhook_events.len(), 1);
    assert!(webhook_events[0].escalated);
}

#[tokio::test]
async fn failing_channel_does_not_stop_others() {
    let broken = Arc::new(RecordingNotifier::new("webhook").failing());
    let console = Arc::new(RecordingNotifier::new("console"));
    let rule = latency_rule().with_channels(&["webhook", "console"]);
    let engine = AlertEngine::new(vec![rule])
        .with_notifier(broken.clone())
        .with_notifier(console.clone());
    let monitor = PerformanceMonitor::default();
    let now = Utc::now();

    slow_op(&monitor, now, 2_000);
    let fired = engine.evaluate_at(&monitor, now).await;

    assert_eq!(fired.len(), 1);
    assert_eq!(broken.attempts(), 1);
    assert_eq!(console.events().len(), 1);
}

#[tokio::test]
async fn resolution_restores_health() {
    let rule = AlertRule::new("errors", AggregateMetric::ErrorRate, Comparison::Gt, 0.1)
        .with_window(Duration::from_secs(60))
        .with_severity(Severity::Critical);
    let engine = AlertEngine::new(vec![rule]);
    let monitor = PerformanceMonitor::default();
    let t0 = Utc::now();

    monitor.record_operation_at(
        &OperationSample {
            success: false,
            ..OperationSample::default()
        },
        t0,
    );
    engine.evaluate_at(&monitor, t0).await;
    let snap = monitor.snapshot_at(t0, Duration::from_secs(60));
    assert_eq!(
        derive_health(&snap, &engine.active_alerts()).label(),
        "unhealthy"
    );

    let t2 = t0 + chrono::Duration::minutes(2);
    slow_op(&monitor, t2, 10);
    engine.evaluate_at(&monitor, t2).await;
    let snap = monitor.snapshot_at(t2, Duration::from_secs(60));
    assert!(engine.active_alerts().is_empty());
    assert_eq!(derive_health(&snap, &engine.active_alerts()).label(), "healthy");
}
