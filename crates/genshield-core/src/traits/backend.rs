// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait for the external image-generation service.

use async_trait::async_trait;

use crate::error::ShieldError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendHealth, GenerationResult};

/// The one outbound operation the pipeline shields callers from.
///
/// Implementations map their transport failures onto
/// [`ShieldError::Network`], [`ShieldError::Timeout`] and
/// [`ShieldError::HttpStatus`] so the retry strategy can classify them.
#[async_trait]
pub trait GenerationBackend: PluginAdapter {
    /// Submits a generation payload and waits for the backend's answer.
    async fn submit_generation(
        &self,
        payload: &serde_json::Value,
    ) -> Result<GenerationResult, ShieldError>;

    /// Probes the backend. Used by operational tooling, not the request path.
    async fn probe(&self) -> Result<BackendHealth, ShieldError>;
}
