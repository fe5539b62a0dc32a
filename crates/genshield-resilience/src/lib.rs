// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for outbound generation calls.
//!
//! - [`ConnectionPool`] bounds in-flight calls and parks excess callers in
//!   FIFO order with a wait timeout.
//! - [`RetryPolicy`] re-runs transient failures with exponential backoff.

pub mod lease;
pub mod pool;
pub mod retry;

pub use lease::{LeaseLedger, LocalLeaseLedger};
pub use pool::{ConnectionPool, Lease, PoolStats};
pub use retry::{RetryOutcome, RetryPolicy, Retryable};
