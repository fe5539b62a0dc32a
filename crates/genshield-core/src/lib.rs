// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the genshield request-optimization pipeline.
//!
//! This crate provides the error taxonomy, request and result types, and
//! the adapter traits the other crates program against. The external
//! generation backend is reached only through [`GenerationBackend`].

pub mod error;
pub mod traits;
pub mod types;

pub use error::ShieldError;
pub use types::{
    AdapterType, AlertEvent, BackendHealth, GenerationRequest, GenerationResult, HealthStatus,
    JobId, Priority, RequestId, Severity,
};

pub use traits::{AlertNotifier, GenerationBackend, PluginAdapter};
