// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the genshield pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level genshield configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional and defaults sensibly.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShieldConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// External generation backend endpoint.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Connection pool bounds.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Request and end-to-end deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Exponential backoff retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Similarity cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background job processor settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Performance monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Standing alert rules. Empty means the built-in rule set.
    #[serde(default)]
    pub alerts: Vec<AlertRuleConfig>,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name reported in logs and status output.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "genshield".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// External generation backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// URL that generation payloads are POSTed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Path (relative to the endpoint origin) probed by health checks.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Bearer token sent with every request. `None` sends no auth header.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            health_path: default_health_path(),
            api_key: None,
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:7860/generate".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum concurrent outbound calls.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long `acquire` waits for a lease before failing.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout_secs(),
        }
    }
}

fn default_max_connections() -> usize {
    10
}

fn default_connection_timeout_secs() -> u64 {
    10
}

/// Deadline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Deadline for a single backend call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for a whole optimized generate, retries included.
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            total_timeout_secs: default_total_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_total_timeout_secs() -> u64 {
    300
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize each delay into `[delay/2, delay]`.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Similarity cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Disable to send every request to the backend.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum blended score for an approximate hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Entry count above which least-recently-accessed entries are evicted.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entry lifetime regardless of access.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Candidates scored per approximate lookup.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Weight of the term-frequency Jaccard component.
    #[serde(default = "default_token_weight")]
    pub token_weight: f64,

    /// Weight of the domain-keyword overlap component.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            max_candidates: default_max_candidates(),
            token_weight: default_token_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_candidates() -> usize {
    50
}

fn default_token_weight() -> f64 {
    0.6
}

fn default_keyword_weight() -> f64 {
    0.4
}

/// Background job processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Dispatcher tick interval.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Maximum jobs in `processing` at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per job before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long terminal jobs stay queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// SQLite file for durable job records. `None` keeps jobs in memory.
    #[serde(default)]
    pub database_path: Option<String>,
}

impl JobsConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            retention_secs: default_retention_secs(),
            database_path: None,
        }
    }
}

fn default_dispatch_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    3
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

/// Performance monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// How often a snapshot is aggregated and logged.
    #[serde(default = "default_aggregation_interval_secs")]
    pub aggregation_interval_secs: u64,

    /// How often alert rules are evaluated.
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// Sliding window used for status snapshots.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Metric points older than this are pruned.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Install the Prometheus recorder.
    #[serde(default)]
    pub prometheus: bool,

    /// Target for the `webhook` alert channel.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

impl MonitorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            aggregation_interval_secs: default_aggregation_interval_secs(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            window_secs: default_window_secs(),
            retention_secs: default_retention_secs(),
            prometheus: false,
            alert_webhook_url: None,
        }
    }
}

fn default_aggregation_interval_secs() -> u64 {
    300
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_window_secs() -> u64 {
    300
}

/// A standing alert rule as written in `[[alerts]]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertRuleConfig {
    /// Unique rule name.
    pub name: String,

    /// Aggregate the rule watches (e.g. `error_rate`, `p95_latency_ms`).
    pub metric: String,

    /// One of `gt`, `gte`, `lt`, `lte`, `eq`.
    #[serde(default = "default_comparison")]
    pub comparison: String,

    /// Value the aggregate is compared against.
    pub threshold: f64,

    /// Evaluation window.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Minimum time between two triggers.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    /// One of `info`, `warning`, `critical`.
    #[serde(default = "default_severity")]
    pub severity: String,

    /// Notification channels (`console`, `webhook`).
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes the rule must stay breached before escalating.
    #[serde(default)]
    pub escalate_after_minutes: Option<u64>,

    /// Severity after escalation.
    #[serde(default)]
    pub escalate_severity: Option<String>,

    /// Extra channels notified on escalation.
    #[serde(default)]
    pub escalate_channels: Vec<String>,
}

fn default_comparison() -> String {
    "gt".to_string()
}

fn default_window_minutes() -> u64 {
    5
}

fn default_cooldown_minutes() -> u64 {
    10
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_channels() -> Vec<String> {
    vec!["console".to_string()]
}

impl AlertRuleConfig {
    /// Minimal rule with defaults for everything but the condition.
    pub fn new(name: &str, metric: &str, comparison: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            metric: metric.to_string(),
            comparison: comparison.to_string(),
            threshold,
            window_minutes: default_window_minutes(),
            cooldown_minutes: default_cooldown_minutes(),
            severity: default_severity(),
            channels: default_channels(),
            enabled: true,
            escalate_after_minutes: None,
            escalate_severity: None,
            escalate_channels: Vec::new(),
        }
    }
}

/// Rule set installed when `[[alerts]]` is empty.
pub fn default_alert_rules() -> Vec<AlertRuleConfig> {
    let mut error_rate = AlertRuleConfig::new("high_error_rate", "error_rate", "gt", 0.10);
    error_rate.severity = "critical".to_string();
    error_rate.escalate_after_minutes = Some(15);
    error_rate.escalate_severity = Some("critical".to_string());
    error_rate.escalate_channels = vec!["webhook".to_string()];

    let slow = AlertRuleConfig::new("slow_responses", "p95_latency_ms", "gt", 60_000.0);

    let mut low_hits = AlertRuleConfig::new("low_cache_hit_rate", "cache_hit_rate", "lt", 0.20);
    low_hits.severity = "info".to_string();
    low_hits.window_minutes = 60;
    low_hits.cooldown_minutes = 60;

    let backlog = AlertRuleConfig::new("queue_backlog", "avg_queue_length", "gt", 50.0);

    vec![error_rate, slow, low_hits, backlog]
}
