// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease accounting behind the connection pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use genshield_core::ShieldError;
use tokio::sync::Notify;

/// Counts outstanding leases.
///
/// The pool only asks the ledger whether a new lease fits and tells it when
/// one is returned. A shared ledger lets several pool instances respect a
/// single global bound.
pub trait LeaseLedger: Send + Sync {
    /// Claim one lease if fewer than `capacity` are outstanding.
    fn try_claim(&self, capacity: usize) -> bool;

    /// Return one lease. Errors if nothing is outstanding.
    fn relinquish(&self) -> Result<(), ShieldError>;

    /// Leases currently outstanding.
    fn outstanding(&self) -> usize;

    /// Signalled by pools after they return a lease to this ledger, so
    /// waiters parked in other pools on the same ledger can re-check.
    fn released(&self) -> &Notify;
}

/// In-process ledger backed by an atomic counter.
#[derive(Debug, Default)]
pub struct LocalLeaseLedger {
    outstanding: AtomicUsize,
    released: Notify,
}

impl LocalLeaseLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseLedger for LocalLeaseLedger {
    fn try_claim(&self, capacity: usize) -> bool {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn relinquish(&self) -> Result<(), ShieldError> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| ShieldError::LeaseAccounting("released more leases than were acquired".into()))
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn released(&self) -> &Notify {
        &self.released
    }
}
