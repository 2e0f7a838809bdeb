// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store trait implemented by the flat-file and relational backends.

use async_trait::async_trait;

use crate::error::CofferError;
use crate::types::{BackendKind, EntryUpdate, HealthStatus, PasswordEntry};

/// CRUD over password entries for one storage backend.
///
/// Implementations do not take the vault lock themselves; the repository
/// wraps every mutation in the lock. Lookups by service or substring have
/// default implementations on top of [`CredentialStore::find_all`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Probe that the backing storage opens and answers a trivial query.
    async fn health_check(&self) -> Result<HealthStatus, CofferError>;

    /// All entries, ordered by service then identifier.
    async fn find_all(&self) -> Result<Vec<PasswordEntry>, CofferError>;

    /// Entries for one service.
    async fn find_by_service(&self, service: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|e| e.service == service)
            .collect())
    }

    /// The entry addressed by `(service, identifier)`, if any.
    async fn find_by_service_and_identifier(
        &self,
        service: &str,
        identifier: &str,
    ) -> Result<Option<PasswordEntry>, CofferError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .find(|e| e.matches(service, identifier)))
    }

    /// Case-insensitive substring search over service and identifier.
    async fn search(&self, needle: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        let needle = needle.to_lowercase();
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|e| {
                e.service.to_lowercase().contains(&needle)
                    || e.identifier.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Number of stored entries.
    async fn count(&self) -> Result<usize, CofferError> {
        Ok(self.find_all().await?.len())
    }

    /// Insert a new entry. Fails with `DuplicateIdentifier` if the pair exists.
    async fn create(&self, entry: &PasswordEntry) -> Result<(), CofferError>;

    /// Modify (and optionally rename) an existing entry, returning the stored result.
    async fn update(&self, update: &EntryUpdate) -> Result<PasswordEntry, CofferError>;

    /// Delete an entry. Returns whether it existed.
    async fn delete(&self, service: &str, identifier: &str) -> Result<bool, CofferError>;

    /// Stamp `last_accessed` on an entry.
    async fn record_access(&self, service: &str, identifier: &str) -> Result<(), CofferError>;

    /// Replace the whole contents of the store.
    async fn replace_all(&self, entries: &[PasswordEntry]) -> Result<(), CofferError>;
}
