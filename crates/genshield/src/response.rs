// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shapes returned to callers of the facade.

use genshield_cache::CacheStats;
use genshield_client::ClientStats;
use genshield_core::{AlertEvent, GenerationResult, HealthStatus};
use genshield_jobs::JobStats;
use genshield_monitor::PerformanceSnapshot;
use serde::Serialize;

/// Outcome of one optimized generate call. Failures are reported in-band.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizedResponse {
    pub success: bool,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    /// Stable error class, e.g. `timeout` or `http_status`.
    pub error_kind: Option<&'static str>,
    pub metrics: ResponseMetrics,
    pub processing_info: ProcessingInfo,
    pub system_status: StatusSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseMetrics {
    pub total_time_ms: u64,
    pub cache_hit: bool,
    /// Similarity of the cached prompt, set on cache hits.
    pub similarity: Option<f64>,
    pub retry_count: u32,
    pub network_latency_ms: u64,
    pub queue_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingInfo {
    pub request_id: String,
    pub correlation_id: String,
    /// Canonical hash of the cached entry that served or stored the result.
    pub cache_key: Option<String>,
}

/// Pipeline state attached to every response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub queue_length: usize,
    pub cache_hit_rate: f64,
    pub health: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub client: ClientStats,
    pub jobs: JobStats,
}

/// Full operational picture.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub health: HealthStatus,
    pub performance: PerformanceSnapshot,
    pub cache: CacheStats,
    pub queue: QueueMetrics,
    pub active_alerts: Vec<AlertEvent>,
}
