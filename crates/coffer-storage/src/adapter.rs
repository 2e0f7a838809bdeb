// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLCipher implementation of the `CredentialStore` trait.

use async_trait::async_trait;
use tracing::debug;

use coffer_core::{
    BackendKind, CofferError, CredentialStore, EntryUpdate, HealthStatus, PasswordEntry,
};

use crate::database::{Database, map_tr_err};
use crate::queries::passwords;

/// Relational credential store.
///
/// Wraps an open [`Database`] and delegates to the typed query module. Lookups
/// by service and substring use SQL instead of the trait's scan defaults.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The wrapped database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn health_check(&self) -> Result<HealthStatus, CofferError> {
        let rows = self
            .db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT count(*) FROM passwords", [], |row| row.get(0))
            })
            .await;
        match rows {
            Ok(n) => {
                debug!(rows = n, "relational store answered health probe");
                Ok(HealthStatus::Healthy)
            }
            Err(e) => Ok(HealthStatus::Unhealthy(map_tr_err(e).to_string())),
        }
    }

    async fn find_all(&self) -> Result<Vec<PasswordEntry>, CofferError> {
        passwords::list_all(&self.db).await
    }

    async fn find_by_service(&self, service: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        passwords::list_by_service(&self.db, service).await
    }

    async fn find_by_service_and_identifier(
        &self,
        service: &str,
        identifier: &str,
    ) -> Result<Option<PasswordEntry>, CofferError> {
        passwords::get(&self.db, service, identifier).await
    }

    async fn search(&self, needle: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        passwords::search(&self.db, needle).await
    }

    async fn count(&self) -> Result<usize, CofferError> {
        passwords::count(&self.db).await
    }

    async fn create(&self, entry: &PasswordEntry) -> Result<(), CofferError> {
        passwords::insert(&self.db, entry).await
    }

    async fn update(&self, update: &EntryUpdate) -> Result<PasswordEntry, CofferError> {
        passwords::update(&self.db, update).await
    }

    async fn delete(&self, service: &str, identifier: &str) -> Result<bool, CofferError> {
        passwords::delete(&self.db, service, identifier).await
    }

    async fn record_access(&self, service: &str, identifier: &str) -> Result<(), CofferError> {
        if passwords::touch(&self.db, service, identifier).await? {
            Ok(())
        } else {
            Err(CofferError::NotFound(format!("{service} / {identifier}")))
        }
    }

    async fn replace_all(&self, entries: &[PasswordEntry]) -> Result<(), CofferError> {
        passwords::replace_all(&self.db, entries).await
    }
}
