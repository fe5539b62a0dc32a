// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that every pluggable component implements.

use async_trait::async_trait;

use crate::error::ShieldError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for genshield adapters.
///
/// Provides identity, lifecycle, and health check capabilities so the
/// facade can report on whatever backend, store, or notifier is plugged in.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, ShieldError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), ShieldError>;
}
