// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimized client for the external generation backend.
//!
//! [`OptimizedClient`] composes the priority queue, the connection pool, and
//! the retry policy in front of any [`GenerationBackend`](genshield_core::GenerationBackend).
//! [`HttpBackend`] is the production backend adapter.

pub mod client;
pub mod http;

pub use client::{ClientFailure, ClientResponse, ClientSettings, ClientStats, OptimizedClient};
pub use http::HttpBackend;
