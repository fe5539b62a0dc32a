// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded connection pool with FIFO waiter hand-off.
//!
//! A [`Lease`] is permission to run one outbound call. At most `capacity`
//! leases are outstanding at any time. When the pool is saturated,
//! [`ConnectionPool::acquire`] parks the caller in an explicit FIFO queue;
//! a released lease is handed straight to the oldest waiter, so a fresh
//! `acquire` can never jump the queue.
//!
//! Pools sharing a [`LeaseLedger`] also wake each other: a lease returned to
//! the ledger by one pool lets the head waiter of another claim it.
//!
//! Waiters are served in arrival order, not request priority. Priority is
//! applied upstream by the client's logical queue. This keeps pool fairness
//! simple; it means a premium request that reaches the pool after a low one
//! waits behind it.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use genshield_core::ShieldError;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::lease::{LeaseLedger, LocalLeaseLedger};

/// Point-in-time pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub active: usize,
    pub waiting: usize,
    pub peak_active: usize,
    pub total_acquired: u64,
    pub total_timeouts: u64,
}

struct Waiter {
    ticket: u64,
    grant: oneshot::Sender<u64>,
}

#[derive(Default)]
struct PoolState {
    waiters: VecDeque<Waiter>,
    outstanding: HashSet<u64>,
    peak_active: usize,
    closed: bool,
}

struct PoolInner {
    capacity: usize,
    wait_timeout: Duration,
    ledger: Arc<dyn LeaseLedger>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    total_acquired: AtomicU64,
    total_timeouts: AtomicU64,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a lease id as outstanding. Caller holds the ledger claim.
    fn register(&self, state: &mut PoolState) -> u64 {
        let id = self.next_id();
        state.outstanding.insert(id);
        state.peak_active = state.peak_active.max(state.outstanding.len());
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Return a lease id, handing the slot to the oldest live waiter if any.
    fn release_id(&self, id: u64) -> Result<(), ShieldError> {
        let mut state = self.lock();
        if !state.outstanding.remove(&id) {
            return Err(ShieldError::LeaseAccounting(format!(
                "lease {id} is not outstanding in this pool"
            )));
        }

        while let Some(waiter) = state.waiters.pop_front() {
            let granted = self.register(&mut state);
            match waiter.grant.send(granted) {
                Ok(()) => {
                    debug!(lease = granted, ticket = waiter.ticket, "lease handed to waiter");
                    return Ok(());
                }
                Err(_) => {
                    // Waiter gave up between queueing and hand-off.
                    state.outstanding.remove(&granted);
                }
            }
        }

        drop(state);
        self.ledger.relinquish()?;
        self.ledger.released().notify_waiters();
        Ok(())
    }

    /// Claim a ledger slot directly for the waiter at the front of the queue.
    fn claim_for_head(&self, ticket: u64) -> Option<u64> {
        let mut state = self.lock();
        if state.waiters.front().map(|w| w.ticket) != Some(ticket) {
            return None;
        }
        if !self.ledger.try_claim(self.capacity) {
            return None;
        }
        state.waiters.pop_front();
        let id = self.register(&mut state);
        if !state.waiters.is_empty() && self.ledger.outstanding() < self.capacity {
            // Room left for the next waiter too.
            self.ledger.released().notify_waiters();
        }
        debug!(lease = id, ticket, "waiter claimed a lease freed on the ledger");
        Some(id)
    }
}

/// A permit for one in-flight outbound call.
///
/// Dropping a lease releases it; [`ConnectionPool::release`] does the same
/// explicitly and reports accounting errors.
pub struct Lease {
    id: u64,
    pool: Arc<PoolInner>,
    armed: bool,
}

impl Lease {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn disarm(mut self) -> (u64, Arc<PoolInner>) {
        self.armed = false;
        (self.id, Arc::clone(&self.pool))
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("id", &self.id).finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = self.pool.release_id(self.id)
        {
            error!(lease = self.id, error = %e, "lease release on drop failed");
        }
    }
}

/// Queue slot of a parked `acquire`; cleans up if the caller goes away.
struct PendingAcquire {
    pool: Arc<PoolInner>,
    ticket: u64,
    grant: oneshot::Receiver<u64>,
    settled: bool,
}

impl PendingAcquire {
    /// Withdraw from the queue. Returns a lease id granted in the meantime.
    fn withdraw(&mut self) -> Option<u64> {
        self.settled = true;
        let mut state = self.pool.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.ticket == self.ticket) {
            state.waiters.remove(pos);
            return None;
        }
        drop(state);
        self.grant.try_recv().ok()
    }
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if !self.settled
            && let Some(id) = self.withdraw()
            && let Err(e) = self.pool.release_id(id)
        {
            error!(lease = id, error = %e, "failed to return lease of abandoned waiter");
        }
    }
}

/// Bounded pool of logical backend connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool with in-process lease accounting.
    pub fn new(capacity: usize, wait_timeout: Duration) -> Self {
        Self::with_ledger(capacity, wait_timeout, Arc::new(LocalLeaseLedger::new()))
    }

    /// Create a pool whose lease count lives in the given ledger.
    pub fn with_ledger(
        capacity: usize,
        wait_timeout: Duration,
        ledger: Arc<dyn LeaseLedger>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                wait_timeout,
                ledger,
                state: Mutex::new(PoolState::default()),
                next_id: AtomicU64::new(1),
                total_acquired: AtomicU64::new(0),
                total_timeouts: AtomicU64::new(0),
            }),
        }
    }

    /// Build from the `[pool]` config section.
    pub fn from_config(config: &genshield_config::model::PoolConfig) -> Self {
        Self::new(config.max_connections, config.connection_timeout())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Take a lease immediately if one is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<Lease> {
        let mut state = self.inner.lock();
        if state.closed || !state.waiters.is_empty() {
            return None;
        }
        if !self.inner.ledger.try_claim(self.inner.capacity) {
            return None;
        }
        let id = self.inner.register(&mut state);
        Some(self.lease(id))
    }

    /// Take a lease, waiting in FIFO order for up to the configured bound.
    pub async fn acquire(&self) -> Result<Lease, ShieldError> {
        let (ticket, grant) = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(ShieldError::Shutdown);
            }
            if state.waiters.is_empty() && self.inner.ledger.try_claim(self.inner.capacity) {
                let id = self.inner.register(&mut state);
                return Ok(self.lease(id));
            }
            let ticket = self.inner.next_id();
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { ticket, grant: tx });
            debug!(ticket, waiting = state.waiters.len(), "pool saturated, queued waiter");
            (ticket, rx)
        };

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.inner.wait_timeout;
        let mut pending = PendingAcquire {
            pool: Arc::clone(&self.inner),
            ticket,
            grant,
            settled: false,
        };
        let released = self.inner.ledger.released();

        loop {
            let notified = released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(id) = self.inner.claim_for_head(ticket) {
                pending.settled = true;
                return Ok(self.lease(id));
            }

            tokio::select! {
                granted = &mut pending.grant => {
                    pending.settled = true;
                    return match granted {
                        Ok(id) => Ok(self.lease(id)),
                        Err(_) => Err(ShieldError::Shutdown),
                    };
                }
                () = notified.as_mut() => {}
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        match pending.withdraw() {
            Some(id) => Ok(self.lease(id)),
            None => {
                self.inner.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(ticket, waited = ?started.elapsed(), "timed out waiting for a lease");
                Err(ShieldError::PoolTimeout {
                    waited: started.elapsed(),
                })
            }
        }
    }

    /// Return a lease. Rejects leases this pool did not hand out.
    pub fn release(&self, lease: Lease) -> Result<(), ShieldError> {
        if !Arc::ptr_eq(&lease.pool, &self.inner) {
            return Err(ShieldError::LeaseAccounting(format!(
                "lease {} belongs to a different pool",
                lease.id
            )));
        }
        let (id, pool) = lease.disarm();
        pool.release_id(id)
    }

    /// Stop granting leases and fail every parked waiter with `Shutdown`.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        let dropped = state.waiters.len();
        state.waiters.clear();
        if dropped > 0 {
            debug!(dropped, "pool closed with waiters pending");
        }
    }

    /// Leases currently outstanding.
    pub fn active(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    /// Callers currently parked in `acquire`.
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Leases that could be granted right now.
    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.inner.ledger.outstanding())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            capacity: self.inner.capacity,
            active: state.outstanding.len(),
            waiting: state.waiters.len(),
            peak_active: state.peak_active,
            total_acquired: self.inner.total_acquired.load(Ordering::Relaxed),
            total_timeouts: self.inner.total_timeouts.load(Ordering::Relaxed),
        }
    }

    fn lease(&self, id: u64) -> Lease {
        Lease {
            id,
            pool: Arc::clone(&self.inner),
            armed: true,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.inner.capacity)
            .field("wait_timeout", &self.inner.wait_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_up_to_capacity() {
        let pool = ConnectionPool::new(2, Duration::from_secs(1));
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.active(), 2);
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().is_none());
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_pool_times_out() {
        let pool = ConnectionPool::new(1, Duration::from_millis(100));
        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ShieldError::PoolTimeout { .. }));
        assert!(!err.is_retryable());
        assert_eq!(pool.waiting(), 0);
        assert_eq!(pool.stats().total_timeouts, 1);
    }

    #[tokio::test]
    async fn release_hands_lease_to_waiter() {
        let pool = ConnectionPool::new(1, Duration::from_secs(5));
        let held = pool.acquire().await.unwrap();

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move { waiter_pool.acquire().await });
        while pool.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        pool.release(held).unwrap();
        // The slot went to the waiter, so a fresh caller cannot take it.
        assert!(pool.try_acquire().is_none());
        let lease = waiter.await.unwrap().unwrap();
        assert_eq!(pool.active(), 1);
        drop(lease);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn dropping_lease_releases_it() {
        let pool = ConnectionPool::new(1, Duration::from_secs(1));
        {
            let _lease = pool.acquire().await.unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn foreign_lease_is_rejected() {
        let a = ConnectionPool::new(1, Duration::from_secs(1));
        let b = ConnectionPool::new(1, Duration::from_secs(1));
        let lease = a.acquire().await.unwrap();
        let err = b.release(lease).unwrap_err();
        assert!(matches!(err, ShieldError::LeaseAccounting(_)));
        // The rejected lease was dropped and returned to its own pool.
        assert_eq!(a.available(), 1);
        assert_eq!(b.available(), 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire() {
        let pool = ConnectionPool::new(1, Duration::from_secs(1));
        pool.close();
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            ShieldError::Shutdown
        ));
    }

    #[tokio::test]
    async fn stats_track_peak() {
        let pool = ConnectionPool::new(3, Duration::from_secs(1));
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.peak_active, 2);
        assert_eq!(stats.total_acquired, 2);
        assert_eq!(stats.active, 0);
    }
}
