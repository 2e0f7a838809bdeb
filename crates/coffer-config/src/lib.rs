// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Coffer secrets vault.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, `COFFER_*` environment variable overrides, and
//! miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use coffer_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("session timeout: {:?}", config.session.timeout());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CofferConfig;

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<CofferConfig, Vec<ConfigError>> {
    finish(loader::load_config())
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<CofferConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content))
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<CofferConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path))
}

#[allow(clippy::result_large_err)]
fn finish(loaded: Result<CofferConfig, figment::Error>) -> Result<CofferConfig, Vec<ConfigError>> {
    let config = loaded.map_err(diagnostic::figment_to_config_errors)?;
    validation::validate_config(&config)?;
    Ok(config)
}
