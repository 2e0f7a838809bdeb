// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./coffer.toml` > `~/.config/coffer/coffer.toml` > `/etc/coffer/coffer.toml`
//! with environment variable overrides via `COFFER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CofferConfig;

/// Config sections that environment variables may target.
const ENV_SECTIONS: &[&str] = &["storage", "session", "lock", "backup", "secrets", "log"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/coffer/coffer.toml` (system-wide)
/// 3. `~/.config/coffer/coffer.toml` (user XDG config)
/// 4. `./coffer.toml` (local directory)
/// 5. `COFFER_*` environment variables
pub fn load_config() -> Result<CofferConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CofferConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CofferConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CofferConfig::default()))
        .merge(Toml::file("/etc/coffer/coffer.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("coffer/coffer.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("coffer.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `COFFER_SESSION_TIMEOUT_MS` maps to `session.timeout_ms`. Variables that
/// do not name a section (for example `COFFER_MASTER_PASSWORD`) are ignored.
fn env_provider() -> Env {
    Env::prefixed("COFFER_").filter_map(|key| map_env_key(key.as_str()).map(Into::into))
}

/// Map a lowercased, prefix-stripped env key onto a dotted config path.
pub fn map_env_key(key: &str) -> Option<String> {
    ENV_SECTIONS.iter().find_map(|section| {
        key.strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|field| !field.is_empty())
            .map(|field| format!("{section}.{field}"))
    })
}
