// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background generation jobs.
//!
//! [`JobProcessor`] accepts requests, returns a job id immediately, and runs
//! the work later under a concurrency cap with per-job retry. Status lives in
//! a [`JobStatusTracker`]: [`MemoryJobTracker`] for tests and ephemeral runs,
//! [`SqliteJobTracker`] when jobs must survive a restart.

pub mod model;
pub mod processor;
pub mod sqlite;
pub mod tracker;

pub use model::{DeadLetter, JobOptions, JobRecord, JobState, JobStats, JobStatus, StateChange};
pub use processor::{JobExecutor, JobProcessor, ProcessorSettings};
pub use sqlite::SqliteJobTracker;
pub use tracker::{JobStatusTracker, MemoryJobTracker};
