// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapter for the external generation backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use genshield_config::model::BackendConfig;
use genshield_core::{
    AdapterType, BackendHealth, GenerationBackend, GenerationResult, HealthStatus, PluginAdapter,
    ShieldError,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

/// Probe latency above which the backend is reported degraded.
const SLOW_PROBE: Duration = Duration::from_secs(5);

/// Talks JSON over HTTP to the generation service.
///
/// `submit_generation` POSTs the payload to the configured endpoint.
/// Transport failures map to `Network`, deadline expiry to `Timeout`, and
/// non-2xx answers to `HttpStatus`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    health_url: reqwest::Url,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, ShieldError> {
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            ShieldError::Config(format!("invalid backend endpoint `{}`: {e}", config.endpoint))
        })?;
        let health_url = endpoint.join(&config.health_path).map_err(|e| {
            ShieldError::Config(format!("invalid health path `{}`: {e}", config.health_path))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ShieldError::Config(format!("invalid API key header value: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ShieldError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint,
            health_url,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn map_transport(&self, e: reqwest::Error) -> ShieldError {
        if e.is_timeout() {
            ShieldError::Timeout {
                duration: self.timeout,
            }
        } else {
            ShieldError::Network {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(self.probe().await?.status)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn submit_generation(
        &self,
        payload: &serde_json::Value,
    ) -> Result<GenerationResult, ShieldError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        debug!(status = %status, "generation response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShieldError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_transport(e)
            } else {
                ShieldError::Backend {
                    message: format!("failed to parse backend response: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        })?;
        Ok(GenerationResult::from_raw(raw))
    }

    async fn probe(&self) -> Result<BackendHealth, ShieldError> {
        let started = Instant::now();
        let outcome = self.client.get(self.health_url.clone()).send().await;
        let latency = started.elapsed();

        let status = match outcome {
            Ok(resp) if resp.status().is_success() && latency > SLOW_PROBE => {
                HealthStatus::Degraded(format!("health probe took {latency:?}"))
            }
            Ok(resp) if resp.status().is_success() => HealthStatus::Healthy,
            Ok(resp) if resp.status().is_server_error() => {
                HealthStatus::Unhealthy(format!("health endpoint returned {}", resp.status()))
            }
            Ok(resp) => HealthStatus::Degraded(format!("health endpoint returned {}", resp.status())),
            Err(e) => HealthStatus::Unhealthy(format!("health probe failed: {e}")),
        };
        Ok(BackendHealth { status, latency })
    }
}
