// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert notification channel trait.

use async_trait::async_trait;

use crate::error::ShieldError;
use crate::traits::adapter::PluginAdapter;
use crate::types::AlertEvent;

/// A destination for alert events.
///
/// Rules address channels by [`PluginAdapter::name`].
#[async_trait]
pub trait AlertNotifier: PluginAdapter {
    async fn notify(&self, event: &AlertEvent) -> Result<(), ShieldError>;
}
