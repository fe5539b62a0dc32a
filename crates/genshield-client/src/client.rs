// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimized client: priority queue in front of a bounded pool, retry around each call.
//!
//! Submitted requests wait in a [`PriorityQueue`]. A single dispatcher task
//! takes a lease from the [`ConnectionPool`] before popping the next request,
//! so the request chosen is always the highest-priority one waiting at the
//! moment a connection frees up. Each request then runs under the
//! [`RetryPolicy`]; the first attempt uses the dispatcher's lease and later
//! attempts lease again.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use genshield_core::{GenerationBackend, GenerationRequest, GenerationResult, ShieldError};
use genshield_queue::{PriorityQueue, QueueDepth};
use genshield_resilience::{ConnectionPool, Lease, PoolStats, RetryPolicy};
use metrics::gauge;
use serde::Serialize;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timeouts and retry schedule for [`OptimizedClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Upper bound on a single backend call.
    pub request_timeout: Duration,
    /// Upper bound on queueing plus every attempt of a submit.
    pub total_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(180),
            total_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &genshield_config::ShieldConfig) -> Self {
        Self {
            request_timeout: config.timeouts.request_timeout(),
            total_timeout: config.timeouts.total_timeout(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// A completed submit.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub result: GenerationResult,
    /// Backend calls made, including the first.
    pub attempts: u32,
    pub retry_count: u32,
    /// Duration of the successful backend call.
    pub network_latency: Duration,
    /// Time spent in the priority queue before dispatch.
    pub queue_wait: Duration,
}

/// A failed submit, with the backend calls it made before giving up.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ClientFailure {
    #[source]
    pub error: ShieldError,
    pub attempts: u32,
}

impl ClientFailure {
    fn new(error: ShieldError, attempts: u32) -> Self {
        Self { error, attempts }
    }

    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl From<ClientFailure> for ShieldError {
    fn from(failure: ClientFailure) -> Self {
        failure.error
    }
}

/// Queue and dispatch counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    pub queued: usize,
    pub depth: QueueDepth,
    pub in_flight: usize,
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub avg_queue_wait_ms: f64,
    pub pool: PoolStats,
}

struct Pending {
    request: GenerationRequest,
    enqueued_at: Instant,
    /// Attempts started so far, readable by a submitter that timed out.
    attempts: Arc<AtomicU32>,
    reply: oneshot::Sender<Result<ClientResponse, ClientFailure>>,
}

struct ClientInner {
    backend: Arc<dyn GenerationBackend>,
    pool: ConnectionPool,
    settings: ClientSettings,
    queue: Mutex<PriorityQueue<Pending>>,
    work: Notify,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    queue_wait_micros: AtomicU64,
    cancel: CancellationToken,
}

impl ClientInner {
    fn queue(&self) -> MutexGuard<'_, PriorityQueue<Pending>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next request whose submitter is still waiting.
    fn pop_live(&self) -> Option<Pending> {
        let mut queue = self.queue();
        while let Some(pending) = queue.dequeue() {
            if pending.reply.is_closed() {
                debug!(
                    correlation_id = pending.request.correlation_id(),
                    "dropping queued request abandoned by its submitter"
                );
                continue;
            }
            gauge!("genshield_queue_length").set(queue.len() as f64);
            return Some(pending);
        }
        gauge!("genshield_queue_length").set(0.0);
        None
    }
}

/// Client that bounds, orders, and retries calls to a [`GenerationBackend`].
#[derive(Clone)]
pub struct OptimizedClient {
    inner: Arc<ClientInner>,
}

impl OptimizedClient {
    /// Build the client and spawn its dispatcher on the current runtime.
    ///
    /// The dispatcher stops when `cancel` fires; requests still queued at
    /// that point fail with `Shutdown`.
    pub fn start(
        backend: Arc<dyn GenerationBackend>,
        pool: ConnectionPool,
        settings: ClientSettings,
        cancel: CancellationToken,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            backend,
            pool,
            settings,
            queue: Mutex::new(PriorityQueue::new()),
            work: Notify::new(),
            in_flight: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            queue_wait_micros: AtomicU64::new(0),
            cancel,
        });
        tokio::spawn(dispatch_loop(Arc::clone(&inner)));
        Self { inner }
    }

    /// Queue a request and wait for its outcome.
    ///
    /// Fails with `Timeout` if queueing plus all attempts exceed the total
    /// timeout; the abandoned request then stops before its next attempt.
    /// The final error of an exhausted retry budget is returned as is.
    pub async fn submit(
        &self,
        request: GenerationRequest,
    ) -> Result<ClientResponse, ClientFailure> {
        if self.inner.cancel.is_cancelled() {
            return Err(ClientFailure::new(ShieldError::Shutdown, 0));
        }
        let (tx, rx) = oneshot::channel();
        let attempts = Arc::new(AtomicU32::new(0));
        let priority = request.priority();
        {
            let mut queue = self.inner.queue();
            queue.enqueue(
                Pending {
                    request,
                    enqueued_at: Instant::now(),
                    attempts: Arc::clone(&attempts),
                    reply: tx,
                },
                priority,
            );
            gauge!("genshield_queue_length").set(queue.len() as f64);
        }
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.work.notify_one();

        let total = self.inner.settings.total_timeout;
        match tokio::time::timeout(total, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientFailure::new(
                ShieldError::Shutdown,
                attempts.load(Ordering::Relaxed),
            )),
            Err(_) => {
                let attempts = attempts.load(Ordering::Relaxed);
                warn!(?total, attempts, "request exceeded total timeout");
                Err(ClientFailure::new(
                    ShieldError::Timeout { duration: total },
                    attempts,
                ))
            }
        }
    }

    /// Requests waiting for dispatch.
    pub fn queue_length(&self) -> usize {
        self.inner.queue().len()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.inner.backend
    }

    pub fn stats(&self) -> ClientStats {
        let (queued, depth) = {
            let queue = self.inner.queue();
            (queue.len(), queue.depth())
        };
        let dispatched = self.inner.dispatched.load(Ordering::Relaxed);
        let wait_micros = self.inner.queue_wait_micros.load(Ordering::Relaxed);
        ClientStats {
            queued,
            depth,
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            total_submitted: self.inner.submitted.load(Ordering::Relaxed),
            total_dispatched: dispatched,
            total_succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            total_failed: self.inner.failed.load(Ordering::Relaxed),
            avg_queue_wait_ms: if dispatched == 0 {
                0.0
            } else {
                wait_micros as f64 / dispatched as f64 / 1000.0
            },
            pool: self.inner.pool.stats(),
        }
    }
}

impl std::fmt::Debug for OptimizedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizedClient")
            .field("backend", &self.inner.backend.name())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

async fn dispatch_loop(inner: Arc<ClientInner>) {
    debug!("client dispatcher started");
    loop {
        if inner.queue().is_empty() {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = inner.work.notified() => continue,
            }
        }

        let lease = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            lease = inner.pool.acquire() => lease,
        };
        let lease = match lease {
            Ok(lease) => lease,
            // Saturated for a full wait bound; queued requests keep waiting.
            Err(ShieldError::PoolTimeout { .. }) => continue,
            Err(e) => {
                warn!(error = %e, "dispatcher cannot lease connections, stopping");
                break;
            }
        };

        let Some(pending) = inner.pop_live() else {
            continue;
        };
        inner.dispatched.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(execute(Arc::clone(&inner), pending, lease));
    }

    let abandoned: Vec<Pending> = {
        let mut queue = inner.queue();
        std::iter::from_fn(|| queue.dequeue()).collect()
    };
    if !abandoned.is_empty() {
        info!(count = abandoned.len(), "failing queued requests on shutdown");
    }
    for pending in abandoned {
        let _ = pending.reply.send(Err(ClientFailure::new(ShieldError::Shutdown, 0)));
    }
    gauge!("genshield_queue_length").set(0.0);
    debug!("client dispatcher stopped");
}

async fn execute(inner: Arc<ClientInner>, pending: Pending, lease: Lease) {
    let queue_wait = pending.enqueued_at.elapsed();
    inner
        .queue_wait_micros
        .fetch_add(queue_wait.as_micros() as u64, Ordering::Relaxed);
    inner.in_flight.fetch_add(1, Ordering::Relaxed);

    let Pending {
        request,
        attempts: started_attempts,
        mut reply,
        ..
    } = pending;
    let policy = &inner.settings.retry;
    let attempt_budget = request.max_retries().clamp(1, policy.max_attempts.max(1));
    let call_timeout = request.timeout().min(inner.settings.request_timeout);
    let payload = Arc::new(request.payload().clone());
    let mut first_lease = Some(lease);

    let retried = policy.execute_with_retry(
        |attempt| {
            started_attempts.store(attempt, Ordering::Relaxed);
            let lease = first_lease.take();
            let inner = Arc::clone(&inner);
            let payload = Arc::clone(&payload);
            async move {
                let lease = match lease {
                    Some(lease) => lease,
                    None => inner.pool.acquire().await?,
                };
                let started = Instant::now();
                let call = inner.backend.submit_generation(&payload);
                let outcome = tokio::time::timeout(call_timeout, call).await;
                drop(lease);
                match outcome {
                    Ok(Ok(result)) if result.success => Ok((result, started.elapsed())),
                    Ok(Ok(result)) => Err(unsuccessful(&result)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        debug!(attempt, ?call_timeout, "backend call timed out");
                        Err(ShieldError::Timeout {
                            duration: call_timeout,
                        })
                    }
                }
            }
        },
        attempt_budget,
    );

    // Stop retrying once the submitter has stopped waiting.
    let outcome = tokio::select! {
        outcome = retried => Some(outcome),
        () = reply.closed() => None,
    };

    inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    let Some(outcome) = outcome else {
        inner.failed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = request.correlation_id(),
            attempts = started_attempts.load(Ordering::Relaxed),
            "submitter gone, abandoning request"
        );
        return;
    };

    let attempts = outcome.attempts;
    let response = match outcome.result {
        Ok((result, network_latency)) => {
            inner.succeeded.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = request.correlation_id(),
                attempts, "generation succeeded"
            );
            Ok(ClientResponse {
                result,
                attempts,
                retry_count: attempts.saturating_sub(1),
                network_latency,
                queue_wait,
            })
        }
        Err(e) => {
            inner.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_id = request.correlation_id(),
                attempts,
                error = %e,
                "generation failed"
            );
            Err(ClientFailure::new(e, attempts))
        }
    };
    let _ = reply.send(response);
}

/// Turn a `success: false` body into an error classified by its message.
fn unsuccessful(result: &GenerationResult) -> ShieldError {
    let message = result
        .raw
        .get("error")
        .and_then(|e| e.as_str().map(str::to_string).or_else(|| Some(e.to_string())))
        .unwrap_or_else(|| "backend reported an unsuccessful generation".to_string());
    ShieldError::backend(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsuccessful_uses_error_text() {
        let result = GenerationResult::from_raw(serde_json::json!({
            "success": false,
            "error": "503 service unavailable"
        }));
        let err = unsuccessful(&result);
        assert!(err.is_retryable());

        let result = GenerationResult::from_raw(serde_json::json!({
            "success": false,
            "error": "prompt violates policy"
        }));
        assert!(!unsuccessful(&result).is_retryable());
    }

    #[test]
    fn settings_follow_config() {
        let config = genshield_config::ShieldConfig::default();
        let settings = ClientSettings::from_config(&config);
        assert_eq!(settings.request_timeout, Duration::from_secs(180));
        assert_eq!(settings.total_timeout, Duration::from_secs(300));
        assert_eq!(settings.retry.max_attempts, 3);
    }
}
