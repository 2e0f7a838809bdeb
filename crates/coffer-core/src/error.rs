// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Coffer secrets vault.

use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all Coffer crates.
///
/// Cryptographic and integrity failures always surface as their own variant
/// so callers can tell a wrong password apart from bit-rot.
#[derive(Debug, Error)]
pub enum CofferError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No session key, an expired session, or a rejected master password.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// AEAD authentication failed, typically a wrong key.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Integrity HMAC or checksum mismatch on a vault, record, or backup.
    #[error("file corrupted: {0}")]
    FileCorrupted(String),

    /// Envelope too short, unknown version, or malformed header.
    #[error("invalid encryption format: {0}")]
    InvalidEncryptionFormat(String),

    /// An entry with the same `(service, identifier)` pair already exists.
    #[error("duplicate identifier `{identifier}` for service `{service}`")]
    DuplicateIdentifier { service: String, identifier: String },

    /// Filesystem permission problems, lock contention, or path escapes.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Relational store errors (open failure, query failure, wrong key).
    #[error("database error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The relational store failed a post-write verification.
    #[error("database integrity check failed: {0}")]
    DatabaseIntegrityFailed(String),

    /// Migration from the flat file to the relational store failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Rolling a migration back failed.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// The application secret is missing, malformed, or could not be created.
    #[error("application secret unavailable: {0}")]
    AppSecretKeyGenerationFailed(String),

    /// Secret store backend failure (keychain or fallback file).
    #[error("secret store error: {0}")]
    SecretStore(String),

    /// The requested entry or artifact does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Plain I/O failure while touching vault files.
    #[error("i/o error: {context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthenticationFailed,
    DecryptionFailed,
    FileCorrupted,
    InvalidEncryptionFormat,
    DuplicateIdentifier,
    PermissionDenied,
    DatabaseError,
    DatabaseIntegrityFailed,
    MigrationFailed,
    RollbackFailed,
    AppSecretKeyGenerationFailed,
    InternalError,
}

impl CofferError {
    /// Map this error onto the stable error-code taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::FileCorrupted(_) => ErrorKind::FileCorrupted,
            Self::InvalidEncryptionFormat(_) => ErrorKind::InvalidEncryptionFormat,
            Self::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Database { .. } => ErrorKind::DatabaseError,
            Self::DatabaseIntegrityFailed(_) => ErrorKind::DatabaseIntegrityFailed,
            Self::MigrationFailed(_) => ErrorKind::MigrationFailed,
            Self::RollbackFailed(_) => ErrorKind::RollbackFailed,
            Self::AppSecretKeyGenerationFailed(_) => ErrorKind::AppSecretKeyGenerationFailed,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::Config(_)
            | Self::SecretStore(_)
            | Self::NotFound(_)
            | Self::Io { .. }
            | Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Wrap an I/O error with a short description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for a database error from any error source.
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Database {
            source: source.into(),
        }
    }
}
