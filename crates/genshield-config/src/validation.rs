// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the semantic constraints serde cannot express. All errors are
//! collected; validation does not fail fast.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AlertRuleConfig, ShieldConfig};

/// Aggregates an alert rule may watch.
pub const KNOWN_ALERT_METRICS: &[&str] = &[
    "request_count",
    "success_rate",
    "error_rate",
    "timeout_rate",
    "avg_latency_ms",
    "median_latency_ms",
    "p95_latency_ms",
    "p99_latency_ms",
    "throughput_per_minute",
    "cache_hit_rate",
    "avg_queue_length",
    "peak_queue_length",
    "avg_retry_count",
];

const KNOWN_COMPARISONS: &[&str] = &["gt", "gte", "lt", "lte", "eq"];
const KNOWN_SEVERITIES: &[&str] = &["info", "warning", "critical"];
const KNOWN_CHANNELS: &[&str] = &["console", "webhook"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.backend.endpoint.trim().is_empty() {
        errors.push(ConfigError::validation("backend.endpoint must not be empty"));
    } else if !(config.backend.endpoint.starts_with("http://")
        || config.backend.endpoint.starts_with("https://"))
    {
        errors.push(ConfigError::validation(format!(
            "backend.endpoint `{}` must be an http(s) URL",
            config.backend.endpoint
        )));
    }

    if config.pool.max_connections == 0 {
        errors.push(ConfigError::validation("pool.max_connections must be at least 1"));
    }
    if config.pool.connection_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "pool.connection_timeout_secs must be greater than 0",
        ));
    }

    let timeouts = &config.timeouts;
    if timeouts.request_timeout_secs == 0 || timeouts.total_timeout_secs == 0 {
        errors.push(ConfigError::validation("timeouts must be greater than 0"));
    } else if timeouts.request_timeout_secs > timeouts.total_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "timeouts.request_timeout_secs ({}) must not exceed timeouts.total_timeout_secs ({})",
            timeouts.request_timeout_secs, timeouts.total_timeout_secs
        )));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ConfigError::validation("retry.max_attempts must be at least 1"));
    }
    if retry.multiplier.is_nan() || retry.multiplier < 1.0 {
        errors.push(ConfigError::validation(format!(
            "retry.multiplier must be at least 1.0, got {}",
            retry.multiplier
        )));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ConfigError::validation(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        )));
    }

    let cache = &config.cache;
    if !(cache.similarity_threshold > 0.0 && cache.similarity_threshold <= 1.0) {
        errors.push(ConfigError::validation(format!(
            "cache.similarity_threshold must be in (0, 1], got {}",
            cache.similarity_threshold
        )));
    }
    if cache.max_entries == 0 {
        errors.push(ConfigError::validation("cache.max_entries must be at least 1"));
    }
    if cache.max_candidates == 0 {
        errors.push(ConfigError::validation("cache.max_candidates must be at least 1"));
    }
    let weights_in_range = (0.0..=1.0).contains(&cache.token_weight)
        && (0.0..=1.0).contains(&cache.keyword_weight);
    if !weights_in_range || ((cache.token_weight + cache.keyword_weight) - 1.0).abs() > 1e-6 {
        errors.push(ConfigError::validation(format!(
            "cache.token_weight ({}) and cache.keyword_weight ({}) must be in [0, 1] and sum to 1",
            cache.token_weight, cache.keyword_weight
        )));
    }

    if config.jobs.max_concurrent == 0 {
        errors.push(ConfigError::validation("jobs.max_concurrent must be at least 1"));
    }
    if config.jobs.max_attempts == 0 {
        errors.push(ConfigError::validation("jobs.max_attempts must be at least 1"));
    }
    if config.jobs.dispatch_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "jobs.dispatch_interval_ms must be greater than 0",
        ));
    }

    if config.monitor.window_secs == 0 || config.monitor.evaluation_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "monitor.window_secs and monitor.evaluation_interval_secs must be greater than 0",
        ));
    }

    let mut seen = HashSet::new();
    for (i, rule) in config.alerts.iter().enumerate() {
        if !seen.insert(rule.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate alert rule name `{}` in [[alerts]]",
                rule.name
            )));
        }
        validate_rule(i, rule, config, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rule(
    index: usize,
    rule: &AlertRuleConfig,
    config: &ShieldConfig,
    errors: &mut Vec<ConfigError>,
) {
    let at = format!("alerts[{index}]");
    if rule.name.trim().is_empty() {
        errors.push(ConfigError::validation(format!("{at}.name must not be empty")));
    }
    if !KNOWN_ALERT_METRICS.contains(&rule.metric.as_str()) {
        errors.push(ConfigError::validation(format!(
            "{at}.metric `{}` is not one of: {}",
            rule.metric,
            KNOWN_ALERT_METRICS.join(", ")
        )));
    }
    if !KNOWN_COMPARISONS.contains(&rule.comparison.as_str()) {
        errors.push(ConfigError::validation(format!(
            "{at}.comparison `{}` is not one of: {}",
            rule.comparison,
            KNOWN_COMPARISONS.join(", ")
        )));
    }
    if rule.window_minutes == 0 {
        errors.push(ConfigError::validation(format!(
            "{at}.window_minutes must be at least 1"
        )));
    }

    let severities = std::iter::once(&rule.severity).chain(rule.escalate_severity.as_ref());
    for severity in severities {
        if !KNOWN_SEVERITIES.contains(&severity.as_str()) {
            errors.push(ConfigError::validation(format!(
                "{at} severity `{severity}` is not one of: {}",
                KNOWN_SEVERITIES.join(", ")
            )));
        }
    }

    for channel in rule.channels.iter().chain(&rule.escalate_channels) {
        if !KNOWN_CHANNELS.contains(&channel.as_str()) {
            errors.push(ConfigError::validation(format!(
                "{at} channel `{channel}` is not one of: {}",
                KNOWN_CHANNELS.join(", ")
            )));
        } else if channel == "webhook" && config.monitor.alert_webhook_url.is_none() {
            errors.push(ConfigError::validation(format!(
                "{at} uses the webhook channel but monitor.alert_webhook_url is not set"
            )));
        }
    }

    let escalates = rule.escalate_severity.is_some() || !rule.escalate_channels.is_empty();
    if escalates && rule.escalate_after_minutes.is_none() {
        errors.push(ConfigError::validation(format!(
            "{at} sets escalation targets without escalate_after_minutes"
        )));
    }
}
