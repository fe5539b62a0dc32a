// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold alert rules and their evaluation.
//!
//! Each evaluation tick computes, per enabled rule, the rule's aggregate over
//! the rule's own window. A breaching rule fires when it is out of cooldown.
//! A rule that stays in breach past its escalation delay fires once more at
//! the escalated severity, also notifying the escalation channels, regardless
//! of cooldown. A rule that stops breaching resolves its active alert.
//!
//! Evaluation never fails: rules without data are skipped for the tick and
//! notifier errors are logged.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use genshield_config::model::{AlertRuleConfig, ShieldConfig, default_alert_rules};
use genshield_core::{AlertEvent, AlertNotifier, ShieldError, Severity};
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::monitor::PerformanceMonitor;
use crate::recording;
use crate::snapshot::{AggregateMetric, PerformanceSnapshot};

/// Default bound on retained alert events.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Gte => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escalation {
    pub after: Duration,
    pub severity: Severity,
    /// Notified in addition to the rule's own channels.
    pub channels: Vec<String>,
}

/// A standing threshold definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub name: String,
    pub metric: AggregateMetric,
    pub comparison: Comparison,
    pub threshold: f64,
    pub window: Duration,
    pub cooldown: Duration,
    pub severity: Severity,
    pub channels: Vec<String>,
    pub enabled: bool,
    pub escalation: Option<Escalation>,
}

impl AlertRule {
    /// Rule with a 5 minute window, 10 minute cooldown, warning severity,
    /// and the console channel.
    pub fn new(
        name: impl Into<String>,
        metric: AggregateMetric,
        comparison: Comparison,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            metric,
            comparison,
            threshold,
            window: Duration::from_secs(5 * 60),
            cooldown: Duration::from_secs(10 * 60),
            severity: Severity::Warning,
            channels: vec!["console".to_string()],
            enabled: true,
            escalation: None,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_channels(mut self, channels: &[&str]) -> Self {
        self.channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_escalation(mut self, escalation: Escalation) -> Self {
        self.escalation = Some(escalation);
        self
    }

    pub fn from_config(config: &AlertRuleConfig) -> Result<Self, ShieldError> {
        let invalid = |field: &str, value: &str| {
            ShieldError::Config(format!(
                "alert rule `{}`: invalid {field} `{value}`",
                config.name
            ))
        };
        let metric = AggregateMetric::from_str(&config.metric)
            .map_err(|_| invalid("metric", &config.metric))?;
        let comparison = Comparison::from_str(&config.comparison)
            .map_err(|_| invalid("comparison", &config.comparison))?;
        let severity = Severity::from_str(&config.severity)
            .map_err(|_| invalid("severity", &config.severity))?;

        let escalation = match config.escalate_after_minutes {
            Some(minutes) => {
                let severity = match &config.escalate_severity {
                    Some(s) => Severity::from_str(s).map_err(|_| invalid("escalate_severity", s))?,
                    None => Severity::Critical,
                };
                Some(Escalation {
                    after: minutes_to_duration(minutes),
                    severity,
                    channels: config.escalate_channels.clone(),
                })
            }
            None => None,
        };

        Ok(Self {
            name: config.name.clone(),
            metric,
            comparison,
            threshold: config.threshold,
            window: minutes_to_duration(config.window_minutes),
            cooldown: minutes_to_duration(config.cooldown_minutes),
            severity,
            channels: config.channels.clone(),
            enabled: config.enabled,
            escalation,
        })
    }
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// True when at least `span` has passed from `since` to `now`.
fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, span: Duration) -> bool {
    (now - since).to_std().is_ok_and(|elapsed| elapsed >= span)
}

#[derive(Debug, Default)]
struct RuleState {
    last_triggered: Option<DateTime<Utc>>,
    breach_started: Option<DateTime<Utc>>,
    escalated: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    rules: HashMap<String, RuleState>,
    history: VecDeque<AlertEvent>,
}

impl EngineState {
    fn resolve_active(&mut self, rule: &str, now: DateTime<Utc>) -> usize {
        let mut resolved = 0;
        for event in self
            .history
            .iter_mut()
            .filter(|e| e.rule == rule && e.is_active())
        {
            event.resolved_at = Some(now);
            resolved += 1;
        }
        resolved
    }
}

/// Evaluates rules against a [`PerformanceMonitor`] and dispatches events.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    notifiers: HashMap<String, Arc<dyn AlertNotifier>>,
    history_limit: usize,
    state: Mutex<EngineState>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            notifiers: HashMap::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Rules from `[[alerts]]`, or the built-in set when none are configured.
    pub fn from_config(config: &ShieldConfig) -> Result<Self, ShieldError> {
        let configured = if config.alerts.is_empty() {
            default_alert_rules()
        } else {
            config.alerts.clone()
        };
        let rules = configured
            .iter()
            .map(AlertRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Register a channel under its adapter name.
    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifiers.insert(notifier.name().to_string(), notifier);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn evaluate(&self, monitor: &PerformanceMonitor) -> Vec<AlertEvent> {
        self.evaluate_at(monitor, Utc::now()).await
    }

    /// Run one evaluation tick. Returns the events fired by this tick.
    pub async fn evaluate_at(
        &self,
        monitor: &PerformanceMonitor,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let mut snapshots: HashMap<Duration, PerformanceSnapshot> = HashMap::new();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            snapshots
                .entry(rule.window)
                .or_insert_with(|| monitor.snapshot_at(now, rule.window));
        }

        let mut fired: Vec<(AlertEvent, Vec<String>)> = Vec::new();
        {
            let mut state = self.state();
            for rule in self.rules.iter().filter(|r| r.enabled) {
                let Some(value) = snapshots
                    .get(&rule.window)
                    .and_then(|s| s.value(rule.metric))
                    .filter(|v| v.is_finite())
                else {
                    debug!(rule = %rule.name, metric = %rule.metric, "no data for alert rule, skipped");
                    continue;
                };
                if let Some(fire) = self.step(&mut state, rule, value, now) {
                    fired.push(fire);
                }
            }
        }

        for (event, channels) in &fired {
            recording::record_alert(&event.severity.to_string());
            self.dispatch(event, channels).await;
        }
        fired.into_iter().map(|(event, _)| event).collect()
    }

    /// Advance one rule. Returns an event and its channels if it fires.
    fn step(
        &self,
        state: &mut EngineState,
        rule: &AlertRule,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<(AlertEvent, Vec<String>)> {
        let breaching = rule.comparison.holds(value, rule.threshold);

        if !breaching {
            let rs = state.rules.entry(rule.name.clone()).or_default();
            rs.breach_started = None;
            rs.escalated = false;
            if state.resolve_active(&rule.name, now) > 0 {
                info!(rule = %rule.name, value, "alert resolved");
            }
            return None;
        }

        let rs = state.rules.entry(rule.name.clone()).or_default();
        let started = *rs.breach_started.get_or_insert(now);
        let escalate = rule
            .escalation
            .as_ref()
            .is_some_and(|esc| !rs.escalated && elapsed_at_least(started, now, esc.after));
        let cooled = rs
            .last_triggered
            .is_none_or(|at| elapsed_at_least(at, now, rule.cooldown));
        if !escalate && !cooled {
            return None;
        }
        if escalate {
            rs.escalated = true;
        }
        rs.last_triggered = Some(now);
        let escalated = rs.escalated;

        let (severity, channels) = match (&rule.escalation, escalated) {
            (Some(esc), true) => {
                let mut channels = rule.channels.clone();
                for ch in &esc.channels {
                    if !channels.contains(ch) {
                        channels.push(ch.clone());
                    }
                }
                (esc.severity, channels)
            }
            _ => (rule.severity, rule.channels.clone()),
        };

        state.resolve_active(&rule.name, now);
        let event = AlertEvent {
            id: format!("alert_{}", uuid::Uuid::new_v4().simple()),
            rule: rule.name.clone(),
            metric: rule.metric.to_string(),
            severity,
            value,
            threshold: rule.threshold,
            comparison: rule.comparison.to_string(),
            message: format!(
                "{} is {value:.3} ({} {})",
                rule.metric,
                rule.comparison.symbol(),
                rule.threshold
            ),
            triggered_at: now,
            escalated,
            acknowledged_at: None,
            resolved_at: None,
        };
        state.history.push_back(event.clone());
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }
        info!(rule = %rule.name, %severity, value, escalated, "alert fired");
        Some((event, channels))
    }

    async fn dispatch(&self, event: &AlertEvent, channels: &[String]) {
        for channel in channels {
            match self.notifiers.get(channel) {
                Some(notifier) => {
                    if let Err(e) = notifier.notify(event).await {
                        warn!(channel = %channel, alert_id = %event.id, error = %e, "alert notification failed");
                    }
                }
                None => {
                    warn!(channel = %channel, alert_id = %event.id, "no notifier registered for alert channel");
                }
            }
        }
    }

    /// Mark an alert acknowledged. Acknowledging twice keeps the first time.
    pub fn acknowledge(&self, alert_id: &str) -> Result<AlertEvent, ShieldError> {
        self.acknowledge_at(alert_id, Utc::now())
    }

    pub fn acknowledge_at(
        &self,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AlertEvent, ShieldError> {
        let mut state = self.state();
        let event = state
            .history
            .iter_mut()
            .find(|e| e.id == alert_id)
            .ok_or_else(|| ShieldError::NotFound {
                kind: "alert",
                id: alert_id.to_string(),
            })?;
        event.acknowledged_at.get_or_insert(now);
        info!(alert_id, rule = %event.rule, "alert acknowledged");
        Ok(event.clone())
    }

    /// Unresolved alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<AlertEvent> {
        self.state()
            .history
            .iter()
            .filter(|e| e.is_active())
            .cloned()
            .collect()
    }

    /// Most recent events first.
    pub fn history(&self, limit: usize) -> Vec<AlertEvent> {
        self.state().history.iter().rev().take(limit).cloned().collect()
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut channels: Vec<&String> = self.notifiers.keys().collect();
        channels.sort();
        f.debug_struct("AlertEngine")
            .field("rules", &self.rules.len())
            .field("channels", &channels)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}
