// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by every genshield crate.
//!
//! Each variant corresponds to one failure class of the optimization
//! pipeline. [`ShieldError::is_retryable`] is the single place where the
//! transient/permanent split is decided; the retry strategy and the job
//! processor both defer to it.

use std::time::Duration;

use thiserror::Error;

/// Message fragments that mark an opaque backend failure as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "econnreset",
    "econnrefused",
    "socket hang up",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "internal server error",
    "500",
    "502",
    "503",
    "504",
];

/// The primary error type used across the pipeline.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// No connection lease became available within the wait bound.
    #[error("connection pool exhausted: no lease available after {waited:?}")]
    PoolTimeout { waited: Duration },

    /// Connection-level failure talking to the backend.
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Backend failure that carries no structured status, classified by message.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored cache entry could not be decoded.
    #[error("corrupted cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    /// A background job exhausted its retry budget.
    #[error("job {job_id} failed permanently after {attempts} attempts: {last_error}")]
    JobPermanentFailure {
        job_id: String,
        attempts: u32,
        last_error: String,
    },

    /// A lease was released that the pool never handed out.
    #[error("lease accounting violation: {0}")]
    LeaseAccounting(String),

    /// Configuration errors (invalid values, unknown keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence errors (job tracker database, cache backing store).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A looked-up entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The component is shutting down and no longer accepts work.
    #[error("component is shutting down")]
    Shutdown,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShieldError {
    /// Convenience constructor for a network error without a source.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Convenience constructor for an opaque backend error without a source.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the failure is transient and worth another attempt.
    ///
    /// Network, timeout, 5xx and 429 responses are transient. A pool timeout is
    /// deliberately not: the caller decides whether to queue again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Backend { message, .. } => is_transient_message(message),
            Self::PoolTimeout { .. }
            | Self::CacheCorruption { .. }
            | Self::JobPermanentFailure { .. }
            | Self::LeaseAccounting(_)
            | Self::Config(_)
            | Self::Storage { .. }
            | Self::NotFound { .. }
            | Self::Shutdown
            | Self::Internal(_) => false,
        }
    }

    /// Short stable label for metrics and job records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PoolTimeout { .. } => "pool_timeout",
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::Backend { .. } => "backend",
            Self::CacheCorruption { .. } => "cache_corruption",
            Self::JobPermanentFailure { .. } => "job_permanent_failure",
            Self::LeaseAccounting(_) => "lease_accounting",
            Self::Config(_) => "config",
            Self::Storage { .. } => "storage",
            Self::NotFound { .. } => "not_found",
            Self::Shutdown => "shutdown",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether this failure should count as a timeout in monitoring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PoolTimeout { .. })
    }
}

/// Classify a free-form error message as transient.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes_are_retryable() {
        assert!(ShieldError::network("reset by peer").is_retryable());
        assert!(
            ShieldError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            ShieldError::HttpStatus {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            ShieldError::HttpStatus {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn caller_faults_are_not_retryable() {
        assert!(
            !ShieldError::HttpStatus {
                status: 400,
                body: "bad prompt".into()
            }
            .is_retryable()
        );
        assert!(
            !ShieldError::PoolTimeout {
                waited: Duration::from_secs(10)
            }
            .is_retryable()
        );
        assert!(!ShieldError::Config("x".into()).is_retryable());
    }

    #[test]
    fn backend_messages_classified_by_pattern() {
        assert!(ShieldError::backend("upstream returned 502 Bad Gateway").is_retryable());
        assert!(ShieldError::backend("Connection refused").is_retryable());
        assert!(ShieldError::backend("request timed out").is_retryable());
        assert!(!ShieldError::backend("prompt rejected by safety filter").is_retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(ShieldError::Shutdown.kind(), "shutdown");
        assert_eq!(
            ShieldError::HttpStatus {
                status: 500,
                body: String::new()
            }
            .kind(),
            "http_status"
        );
    }
}
