// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.
//! Without one the calls are no-ops.

use metrics::{describe_counter, describe_gauge, describe_histogram};

use crate::sample::OperationSample;

/// Register all genshield metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("genshield_requests_total", "Optimized generate calls by outcome");
    describe_histogram!(
        "genshield_request_duration_seconds",
        "End-to-end optimized generate latency in seconds"
    );
    describe_counter!(
        "genshield_cache_lookups_total",
        "Similarity cache lookups by result"
    );
    describe_gauge!("genshield_queue_length", "Requests waiting for a connection");
    describe_counter!("genshield_jobs_total", "Background job transitions by state");
    describe_counter!("genshield_alerts_total", "Alert events fired by severity");
}

/// Record one completed operation.
pub fn record_operation(sample: &OperationSample) {
    let outcome = match (sample.success, sample.timed_out) {
        (true, _) => "success",
        (false, true) => "timeout",
        (false, false) => "error",
    };
    metrics::counter!("genshield_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("genshield_request_duration_seconds").record(sample.duration.as_secs_f64());
}

/// Record a fired alert.
pub fn record_alert(severity: &str) {
    metrics::counter!("genshield_alerts_total", "severity" => severity.to_string()).increment(1);
}
