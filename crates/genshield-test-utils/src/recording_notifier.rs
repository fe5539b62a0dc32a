// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert channel that captures events for assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use genshield_core::{
    AdapterType, AlertEvent, AlertNotifier, HealthStatus, PluginAdapter, ShieldError,
};

/// An [`AlertNotifier`] registered under a chosen channel name.
///
/// A failing notifier counts attempts but keeps no events.
pub struct RecordingNotifier {
    name: String,
    failing: bool,
    attempts: AtomicUsize,
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failing: false,
            attempts: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Make every delivery fail with a network error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
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
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), ShieldError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ShieldError::network(format!(
                "channel {} unavailable",
                self.name
            )));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
