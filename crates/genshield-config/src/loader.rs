// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./genshield.toml` > `~/.config/genshield/genshield.toml`
//! > `/etc/genshield/genshield.toml` with environment variable overrides via
//! the `GENSHIELD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ShieldConfig;

/// Sections that env var names are split on, longest prefix first.
const ENV_SECTIONS: &[&str] = &[
    "service", "backend", "pool", "timeouts", "retry", "cache", "jobs", "monitor",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/genshield/genshield.toml` (system-wide)
/// 3. `~/.config/genshield/genshield.toml` (user XDG config)
/// 4. `./genshield.toml` (local directory)
/// 5. `GENSHIELD_*` environment variables
pub fn load_config() -> Result<ShieldConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ShieldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShieldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ShieldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShieldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ShieldConfig::default()))
        .merge(Toml::file("/etc/genshield/genshield.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("genshield/genshield.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("genshield.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")`: key names contain
/// underscores, so `GENSHIELD_POOL_MAX_CONNECTIONS` must map to
/// `pool.max_connections`, not `pool.max.connections`.
fn env_provider() -> Env {
    Env::prefixed("GENSHIELD_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section)
            && let Some(field) = rest.strip_prefix('_')
        {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}
