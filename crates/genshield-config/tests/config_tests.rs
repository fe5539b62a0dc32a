// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the genshield configuration system.

use genshield_config::diagnostic::ConfigError;
use genshield_config::model::ShieldConfig;
use genshield_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes into the model.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "edge-1"
log_level = "debug"

[backend]
endpoint = "https://gen.example/v1/images"
api_key = "sk-test"

[pool]
max_connections = 4
connection_timeout_secs = 2

[timeouts]
request_timeout_secs = 60
total_timeout_secs = 120

[retry]
max_attempts = 5
base_delay_ms = 250
max_delay_ms = 4000
multiplier = 3.0
jitter = true

[cache]
similarity_threshold = 0.9
max_entries = 200
ttl_secs = 3600

[jobs]
max_concurrent = 2
database_path = "/tmp/jobs.db"

[monitor]
window_secs = 600
alert_webhook_url = "https://hooks.example/alerts"

[[alerts]]
name = "errors"
metric = "error_rate"
comparison = "gte"
threshold = 0.25
cooldown_minutes = 15
severity = "critical"
channels = ["console", "webhook"]
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "edge-1");
    assert_eq!(config.backend.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.pool.max_connections, 4);
    assert_eq!(config.timeouts.request_timeout_secs, 60);
    assert_eq!(config.retry.max_attempts, 5);
    assert!(config.retry.jitter);
    assert!((config.cache.similarity_threshold - 0.9).abs() < f64::EPSILON);
    assert_eq!(config.jobs.database_path.as_deref(), Some("/tmp/jobs.db"));
    assert_eq!(config.alerts.len(), 1);
    assert_eq!(config.alerts[0].cooldown_minutes, 15);
    assert_eq!(config.alerts[0].window_minutes, 5);

    let validated = load_and_validate_str(toml).expect("should validate");
    assert_eq!(validated.monitor.window_secs, 600);
}

/// Empty TOML yields the documented defaults.
#[test]
fn empty_toml_uses_documented_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.pool.max_connections, 10);
    assert_eq!(config.pool.connection_timeout_secs, 10);
    assert_eq!(config.timeouts.request_timeout_secs, 180);
    assert_eq!(config.timeouts.total_timeout_secs, 300);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.retry.max_delay_ms, 8000);
    assert!((config.retry.multiplier - 2.0).abs() < f64::EPSILON);
    assert!((config.cache.similarity_threshold - 0.85).abs() < f64::EPSILON);
    assert_eq!(config.cache.max_entries, 1000);
    assert_eq!(config.cache.ttl_secs, 86_400);
    assert_eq!(config.cache.max_candidates, 50);
    assert_eq!(config.jobs.dispatch_interval_ms, 1000);
    assert_eq!(config.monitor.aggregation_interval_secs, 300);
    assert!(config.alerts.is_empty());
}

/// Unknown key inside a section is rejected.
#[test]
fn unknown_field_in_pool_rejected() {
    let toml = r#"
[pool]
max_conections = 3
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let msg = err.to_string();
    assert!(
        msg.contains("unknown field") || msg.contains("max_conections"),
        "got: {msg}"
    );
}

/// Unknown key turns into a diagnostic with a suggestion.
#[test]
fn unknown_key_diagnostic_carries_suggestion() {
    let toml = r#"
[cache]
similarity_treshold = 0.9
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("similarity_threshold"));
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_reports_invalid_type() {
    let toml = r#"
[pool]
max_connections = "many"
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. }))
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_errors_surface_from_str_loader() {
    let toml = r#"
[retry]
base_delay_ms = 9000
max_delay_ms = 1000
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("base_delay_ms"))
    ));
}

/// Dotted overrides (what the env provider produces) land in the right field.
#[test]
fn dotted_override_sets_nested_field() {
    use figment::{Figment, providers::Serialized};

    let config: ShieldConfig = Figment::new()
        .merge(Serialized::defaults(ShieldConfig::default()))
        .merge(("pool.max_connections", 32))
        .merge(("cache.similarity_threshold", 0.95))
        .extract()
        .expect("should merge overrides");

    assert_eq!(config.pool.max_connections, 32);
    assert!((config.cache.similarity_threshold - 0.95).abs() < f64::EPSILON);
}

/// Alert rule omitting optional fields picks up defaults.
#[test]
fn alert_rule_defaults() {
    let toml = r#"
[[alerts]]
name = "slow"
metric = "p95_latency_ms"
threshold = 30000.0
"#;
    let config = load_and_validate_str(toml).expect("should validate");
    let rule = &config.alerts[0];
    assert_eq!(rule.comparison, "gt");
    assert_eq!(rule.severity, "warning");
    assert_eq!(rule.channels, vec!["console"]);
    assert_eq!(rule.cooldown_minutes, 10);
    assert!(rule.enabled);
    assert!(rule.escalate_after_minutes.is_none());
}

/// Config round-trips through serde_json (used by `genshield config`).
#[test]
fn config_serializes_to_json() {
    let config = ShieldConfig::default();
    let json = serde_json::to_value(&config).expect("should serialize");
    assert_eq!(json["pool"]["max_connections"], 10);
    assert_eq!(json["cache"]["max_entries"], 1000);
}
