// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use genshield_resilience::{ConnectionPool, LeaseLedger, LocalLeaseLedger};
use proptest::prelude::*;

proptest! {
    /// Any interleaving of acquires and releases keeps the pool within bounds.
    #[test]
    fn outstanding_never_exceeds_capacity(
        capacity in 1usize..8,
        ops in proptest::collection::vec(any::<bool>(), 1..200),
    ) {
        let pool = ConnectionPool::new(capacity, Duration::from_millis(10));
        let mut held = Vec::new();
        for acquire in ops {
            if acquire {
                if let Some(lease) = pool.try_acquire() {
                    held.push(lease);
                }
            } else if let Some(lease) = held.pop() {
                pool.release(lease).unwrap();
            }
            prop_assert!(pool.active() <= capacity);
            prop_assert_eq!(pool.active(), held.len());
            prop_assert_eq!(pool.available(), capacity - held.len());
        }
        held.clear();
        prop_assert_eq!(pool.available(), capacity);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_respect_capacity() {
    let pool = ConnectionPool::new(3, Duration::from_secs(5));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let lease = pool.acquire().await.unwrap();
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            pool.release(lease).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = pool.stats();
    assert_eq!(stats.total_acquired, 20);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn waiters_are_served_in_arrival_order() {
    let pool = ConnectionPool::new(1, Duration::from_secs(5));
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let p = pool.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let lease = p.acquire().await.unwrap();
            order.lock().unwrap().push(i);
            drop(lease);
        }));
        while pool.waiting() < i + 1 {
            tokio::task::yield_now().await;
        }
    }

    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn shared_ledger_bounds_two_pools() {
    let ledger: Arc<dyn LeaseLedger> = Arc::new(LocalLeaseLedger::new());
    let a = ConnectionPool::with_ledger(2, Duration::from_millis(50), Arc::clone(&ledger));
    let b = ConnectionPool::with_ledger(2, Duration::from_millis(50), Arc::clone(&ledger));

    let _one = a.try_acquire().unwrap();
    let _two = b.try_acquire().unwrap();
    assert!(a.try_acquire().is_none());
    assert!(b.try_acquire().is_none());
    assert_eq!(ledger.outstanding(), 2);
}

#[tokio::test]
async fn release_in_one_pool_wakes_waiter_of_another() {
    let ledger: Arc<dyn LeaseLedger> = Arc::new(LocalLeaseLedger::new());
    let a = ConnectionPool::with_ledger(1, Duration::from_secs(5), Arc::clone(&ledger));
    let b = ConnectionPool::with_ledger(1, Duration::from_millis(500), Arc::clone(&ledger));

    let held = a.acquire().await.unwrap();
    let waiter_pool = b.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });
    while b.waiting() == 0 {
        tokio::task::yield_now().await;
    }

    a.release(held).unwrap();
    let lease = waiter.await.unwrap().unwrap();
    assert_eq!(b.active(), 1);
    assert_eq!(b.waiting(), 0);
    assert_eq!(ledger.outstanding(), 1);
    assert!(a.try_acquire().is_none());

    drop(lease);
    assert_eq!(ledger.outstanding(), 0);
    assert!(b.try_acquire().is_some());
}
