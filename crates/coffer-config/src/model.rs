// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Coffer secrets vault.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Cryptographic parameters (PBKDF2 iterations, key
//! lengths, envelope version) are deliberately absent: they are constants.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Coffer configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CofferConfig {
    /// Where vault artifacts live on disk.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session inactivity window.
    #[serde(default)]
    pub session: SessionConfig,

    /// Lock marker timing.
    #[serde(default)]
    pub lock: LockConfig,

    /// Backup retention.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Secret store backend selection.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Storage location configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the vault file, database, lock marker, backups and
    /// the master-password record.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Backend used when a vault is created from scratch. Existing vaults
    /// keep whichever backend is present on disk.
    #[serde(default)]
    pub new_vault_backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            new_vault_backend: StorageBackend::default(),
        }
    }
}

/// Storage backend for newly created vaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single envelope-encoded file.
    File,
    /// SQLCipher database.
    #[default]
    Relational,
}

impl StorageConfig {
    /// The data directory as a path.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("coffer"))
        .unwrap_or_else(|| PathBuf::from(".coffer"))
        .to_string_lossy()
        .into_owned()
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Inactivity window in milliseconds after which cached key material is
    /// scrubbed (default: 300000 = 5 minutes).
    #[serde(default = "default_session_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_session_timeout_ms() -> u64 {
    5 * 60 * 1000
}

/// Lock marker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Age in milliseconds after which a lock marker is considered abandoned.
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,

    /// Sleep between acquisition attempts, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Number of acquisition attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: default_stale_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl LockConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_stale_timeout_ms() -> u64 {
    10_000
}

fn default_retry_interval_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    50
}

/// Backup retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Maximum number of retained backups; the oldest is evicted first.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Snapshot the previous vault contents before every flat-file write.
    #[serde(default = "default_auto_backup")]
    pub auto_backup: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
            auto_backup: default_auto_backup(),
        }
    }
}

fn default_max_backups() -> usize {
    10
}

fn default_auto_backup() -> bool {
    true
}

/// Which secret store strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Probe the OS keychain and fall back to the encrypted file.
    #[default]
    Auto,
    /// OS keychain only.
    Keychain,
    /// Encrypted local file only.
    File,
}

/// Secret store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Keychain service name under which accounts are stored.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Backend selection strategy.
    #[serde(default)]
    pub backend: SecretBackend,

    /// Override for the encrypted fallback file location.
    /// Defaults to `<data_dir>/secrets.enc`.
    #[serde(default)]
    pub fallback_file: Option<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            backend: SecretBackend::default(),
            fallback_file: None,
        }
    }
}

fn default_service_name() -> String {
    "coffer".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
