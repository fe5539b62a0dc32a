// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for genshield integration tests.
//!
//! Provides scripted adapters and a harness for fast, deterministic tests
//! without a real generation backend.
//!
//! # Components
//!
//! - [`MockBackend`] - Scripted generation backend with call accounting
//! - [`RecordingNotifier`] - Alert channel that records what it receives
//! - [`TestHarness`] - A fully wired [`GenShield`](genshield::GenShield) over a mock backend

pub mod harness;
pub mod mock_backend;
pub mod recording_notifier;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_backend::{MockBackend, MockStep};
pub use recording_notifier::RecordingNotifier;
