// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Envelope-encrypted secrets vault engine for Coffer.
//!
//! A master password and a per-installation application secret derive the
//! session key through PBKDF2-HMAC-SHA256. The key seals each stored
//! password, the flat-file container, backups, and the master-password
//! record in one versioned AES-256-GCM envelope format, and keys the
//! SQLCipher database when the relational backend is active.

pub mod auth;
pub mod backup;
pub mod crypto;
pub mod envelope;
pub mod file_store;
pub mod integrity;
pub mod kdf;
pub mod legacy;
pub mod lock;
pub mod migration;
pub mod passgen;
pub mod paths;
pub mod prompt;
pub mod record;
pub mod repository;
pub mod session;
pub mod vault;

#[cfg(test)]
mod testing;

pub use auth::{AttemptBudget, Authenticator, SetupOutcome};
pub use backup::{BackupInfo, BackupManager, BackupSnapshot, BackupStore, RecoverySource};
pub use integrity::{CheckResult, CheckStatus, IntegrityReport};
pub use legacy::UnsealedPasswords;
pub use lock::{LockGuard, LockManager};
pub use migration::{MigrationEngine, MigrationOutcome, MigrationReport};
pub use passgen::generate_password;
pub use paths::VaultPaths;
pub use prompt::{get_master_password, get_new_master_password};
pub use repository::VaultRepository;
pub use session::SessionHandle;
pub use vault::Vault;
