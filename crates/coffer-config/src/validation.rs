// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::CofferConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &CofferConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.data_dir.trim().is_empty() {
        fail("storage.data_dir must not be empty".to_string());
    }

    if config.session.timeout_ms == 0 {
        fail("session.timeout_ms must be greater than 0".to_string());
    }

    if config.lock.retry_interval_ms == 0 {
        fail("lock.retry_interval_ms must be greater than 0".to_string());
    }

    if config.lock.stale_timeout_ms < config.lock.retry_interval_ms {
        fail(format!(
            "lock.stale_timeout_ms ({}) must be at least lock.retry_interval_ms ({})",
            config.lock.stale_timeout_ms, config.lock.retry_interval_ms
        ));
    }

    if config.backup.max_backups == 0 {
        fail("backup.max_backups must be at least 1".to_string());
    }

    if config.secrets.service_name.trim().is_empty() {
        fail("secrets.service_name must not be empty".to_string());
    }

    if !matches!(
        config.log.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        fail(format!(
            "log.level `{}` is not one of trace, debug, info, warn, error",
            config.log.level
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CofferConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CofferConfig::default()).is_ok());
    }

    #[test]
    fn zero_session_timeout_fails_validation() {
        let mut config = CofferConfig::default();
        config.session.timeout_ms = 0;
        assert!(messages(&config).iter().any(|m| m.contains("session.timeout_ms")));
    }

    #[test]
    fn stale_timeout_shorter_than_retry_interval_fails() {
        let mut config = CofferConfig::default();
        config.lock.stale_timeout_ms = 50;
        config.lock.retry_interval_ms = 100;
        assert!(messages(&config).iter().any(|m| m.contains("stale_timeout_ms")));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = CofferConfig::default();
        config.storage.data_dir = "  ".to_string();
        config.backup.max_backups = 0;
        config.log.level = "loud".to_string();
        assert_eq!(messages(&config).len(), 3);
    }
}
