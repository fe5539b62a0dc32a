// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in alert channels.

use std::time::Duration;

use async_trait::async_trait;
use genshield_core::{
    AdapterType, AlertEvent, AlertNotifier, HealthStatus, PluginAdapter, Severity, ShieldError,
};
use tracing::{error, info, warn};

/// Writes alerts to the log at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl PluginAdapter for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl AlertNotifier for ConsoleNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), ShieldError> {
        match event.severity {
            Severity::Critical => error!(
                alert_id = %event.id,
                rule = %event.rule,
                value = event.value,
                escalated = event.escalated,
                "ALERT {}", event.message
            ),
            Severity::Warning => warn!(
                alert_id = %event.id,
                rule = %event.rule,
                value = event.value,
                escalated = event.escalated,
                "ALERT {}", event.message
            ),
            Severity::Info => info!(
                alert_id = %event.id,
                rule = %event.rule,
                value = event.value,
                "ALERT {}", event.message
            ),
        }
        Ok(())
    }
}

/// POSTs each alert as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ShieldError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| ShieldError::Config(format!("invalid alert webhook url `{url}`: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShieldError::Internal(format!("failed to build webhook client: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl PluginAdapter for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ShieldError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShieldError> {
        Ok(())
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), ShieldError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({ "type": "alert", "alert": event }))
            .send()
            .await
            .map_err(|e| ShieldError::Network {
                message: format!("alert webhook delivery failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShieldError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tracing_test::traced_test;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn event(severity: Severity) -> AlertEvent {
        AlertEvent {
            id: "alert_1".into(),
            rule: "high_error_rate".into(),
            metric: "error_rate".into(),
            severity,
            value: 0.42,
            threshold: 0.1,
            comparison: "gt".into(),
            message: "error_rate is 0.420 (> 0.1)".into(),
            triggered_at: Utc::now(),
            escalated: false,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn console_logs_alert() {
        ConsoleNotifier.notify(&event(Severity::Critical)).await.unwrap();
        assert!(logs_contain("ALERT error_rate is 0.420"));
        assert!(logs_contain("high_error_rate"));
    }

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/alerts"))
            .and(body_partial_json(serde_json::json!({
                "type": "alert",
                "alert": { "rule": "high_error_rate", "severity": "warning" }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(&format!("{}/hooks/alerts", server.uri()), Duration::from_secs(2))
                .unwrap();
        notifier.notify(&event(Severity::Warning)).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_rejection_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&server.uri(), Duration::from_secs(2)).unwrap();
        let err = notifier.notify(&event(Severity::Info)).await.unwrap_err();
        assert!(matches!(err, ShieldError::HttpStatus { status: 500, .. }));
    }

    #[test]
    fn webhook_rejects_bad_url() {
        assert!(matches!(
            WebhookNotifier::new("::nope::", Duration::from_secs(1)),
            Err(ShieldError::Config(_))
        ));
    }
}
