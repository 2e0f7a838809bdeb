// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the vault backends and the storage engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// All persisted timestamps use this format so they sort lexicographically.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A stored credential.
///
/// `encrypted_password` is opaque to the storage layer; `(service, identifier)`
/// is unique across the whole vault regardless of backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordEntry {
    pub service: String,
    pub identifier: String,
    #[serde(alias = "encryptedPassword")]
    pub encrypted_password: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: String,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: String,
    #[serde(default, alias = "lastAccessed", skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

impl PasswordEntry {
    /// Create a fresh entry stamped with the current time.
    pub fn new(
        service: impl Into<String>,
        identifier: impl Into<String>,
        encrypted_password: impl Into<String>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            service: service.into(),
            identifier: identifier.into(),
            encrypted_password: encrypted_password.into(),
            created_at: now.clone(),
            updated_at: now,
            last_accessed: None,
        }
    }

    /// Whether this entry is addressed by the given pair.
    pub fn matches(&self, service: &str, identifier: &str) -> bool {
        self.service == service && self.identifier == identifier
    }
}

impl std::fmt::Debug for PasswordEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordEntry")
            .field("service", &self.service)
            .field("identifier", &self.identifier)
            .field("encrypted_password", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("last_accessed", &self.last_accessed)
            .finish()
    }
}

/// A modification of an existing entry.
///
/// Renames are expressed by setting `old_identifier` to the current identifier
/// and `identifier` to the new one. A `None` password keeps the stored ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUpdate {
    pub service: String,
    pub old_identifier: Option<String>,
    pub identifier: String,
    pub encrypted_password: Option<String>,
}

impl EntryUpdate {
    /// Replace the password of `(service, identifier)`.
    pub fn password(
        service: impl Into<String>,
        identifier: impl Into<String>,
        encrypted_password: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            old_identifier: None,
            identifier: identifier.into(),
            encrypted_password: Some(encrypted_password.into()),
        }
    }

    /// Rename `(service, from)` to `(service, to)`, keeping the password.
    pub fn rename(
        service: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            old_identifier: Some(from.into()),
            identifier: to.into(),
            encrypted_password: None,
        }
    }

    /// The identifier the existing entry is currently stored under.
    pub fn current_identifier(&self) -> &str {
        self.old_identifier.as_deref().unwrap_or(&self.identifier)
    }

    /// Whether this update changes the identifier.
    pub fn is_rename(&self) -> bool {
        self.current_identifier() != self.identifier
    }

    /// Apply this update to `entry` in place, bumping `updated_at`.
    pub fn apply_to(&self, entry: &mut PasswordEntry) {
        entry.identifier = self.identifier.clone();
        if let Some(ref password) = self.encrypted_password {
            entry.encrypted_password = password.clone();
        }
        entry.updated_at = timestamp_now();
    }
}

/// Which storage backend holds the vault.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Envelope-encoded JSON array in a single file.
    File,
    /// SQLCipher-encrypted relational store.
    Relational,
}

/// Health status reported by backend probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but something looks off.
    Degraded(String),
    /// Backend cannot be used.
    Unhealthy(String),
}
