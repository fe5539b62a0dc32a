// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation backend for deterministic testing.
//!
//! `MockBackend` answers from a FIFO script of [`MockStep`]s, then from a
//! fallback step. It counts calls, records payloads, and tracks the highest
//! number of calls it saw in flight at once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use genshield_core::{
    AdapterType, BackendHealth, GenerationBackend, GenerationResult, HealthStatus, PluginAdapter,
    ShieldError,
};

/// One scripted backend answer.
#[derive(Debug, Clone)]
pub enum MockStep {
    Ok(GenerationResult),
    Network(String),
    Status(u16),
    Timeout(Duration),
}

impl MockStep {
    /// A successful result carrying `url`.
    pub fn ok(url: impl Into<String>) -> Self {
        MockStep::Ok(GenerationResult::with_url(url))
    }

    pub fn network(message: impl Into<String>) -> Self {
        MockStep::Network(message.into())
    }

    pub fn status(code: u16) -> Self {
        MockStep::Status(code)
    }

    pub fn timeout(after: Duration) -> Self {
        MockStep::Timeout(after)
    }

    fn into_outcome(self) -> Result<GenerationResult, ShieldError> {
        match self {
            MockStep::Ok(result) => Ok(result),
            MockStep::Network(message) => Err(ShieldError::network(message)),
            MockStep::Status(status) => Err(ShieldError::HttpStatus {
                status,
                body: format!("mock status {status}"),
            }),
            MockStep::Timeout(duration) => Err(ShieldError::Timeout { duration }),
        }
    }
}

/// A scripted [`GenerationBackend`].
///
/// When both the script and the fallback are empty, every call succeeds with
/// a placeholder URL.
pub struct MockBackend {
    script: Mutex<VecDeque<MockStep>>,
    fallback: Option<MockStep>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    payloads: Mutex<Vec<serde_json::Value>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Append a step to the script.
    pub fn then(self, step: MockStep) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Answer used once the script runs out.
    pub fn fallback(mut self, step: MockStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls started so far, including ones abandoned by a timeout.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Payloads in the order calls started.
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self) -> MockStep {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| MockStep::ok("https://mock.invalid/image.png"))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn submit_generation(
        &self,
        payload: &serde_json::Value,
    ) -> Result<GenerationResult, ShieldError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let step = self.next_step();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        step.into_outcome()
    }

    async fn probe(&self) -> Result<BackendHealth, ShieldError> {
        Ok(BackendHealth {
            status: HealthStatus::Healthy,
            latency: self.latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_fallback() {
        let backend = MockBackend::new()
            .then(MockStep::status(503))
            .fallback(MockStep::network("down"));
        let payload = serde_json::json!({"prompt": "x"});

        let first = backend.submit_generation(&payload).await.unwrap_err();
        assert!(matches!(first, ShieldError::HttpStatus { status: 503, .. }));
        let second = backend.submit_generation(&payload).await.unwrap_err();
        assert!(matches!(second, ShieldError::Network { .. }));
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.payloads().len(), 2);
    }

    #[tokio::test]
    async fn empty_script_succeeds() {
        let backend = MockBackend::new();
        let result = backend
            .submit_generation(&serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(backend.max_concurrency(), 1);
    }
}
