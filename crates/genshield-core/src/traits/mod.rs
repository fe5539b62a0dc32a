// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod notifier;

pub use adapter::PluginAdapter;
pub use backend::GenerationBackend;
pub use notifier::AlertNotifier;
