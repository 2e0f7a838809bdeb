// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dual-backend vault repository.
//!
//! The backend is chosen on every call by probing the data directory: an
//! existing database wins, then an existing vault file, then the configured
//! backend for new vaults. Mutations run under the vault lock; reads do not.

use coffer_config::model::StorageBackend;
use coffer_core::{BackendKind, CofferError, CredentialStore, EntryUpdate, PasswordEntry};
use coffer_storage::{Database, SqliteCredentialStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backup::BackupStore;
use crate::file_store::FileCredentialStore;
use crate::lock::LockManager;
use crate::paths::VaultPaths;
use crate::session::SessionHandle;

/// Settings the repository needs beyond paths and session.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    pub new_vault_backend: StorageBackend,
    pub auto_backup: bool,
    pub max_backups: usize,
}

/// The backend in use for one call.
pub enum ActiveStore {
    File(FileCredentialStore),
    Relational(SqliteCredentialStore),
}

impl ActiveStore {
    pub fn as_dyn(&self) -> &dyn CredentialStore {
        match self {
            Self::File(store) => store,
            Self::Relational(store) => store,
        }
    }
}

/// Entry-level access to whichever backend holds the vault.
pub struct VaultRepository {
    paths: VaultPaths,
    session: SessionHandle,
    lock: LockManager,
    backups: BackupStore,
    options: RepositoryOptions,
    db: Mutex<Option<SqliteCredentialStore>>,
}

impl std::fmt::Debug for VaultRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRepository")
            .field("root", &self.paths.root())
            .field("options", &self.options)
            .finish()
    }
}

impl VaultRepository {
    pub fn new(
        paths: VaultPaths,
        session: SessionHandle,
        lock: LockManager,
        options: RepositoryOptions,
    ) -> Self {
        let backups = BackupStore::new(paths.backup_dir(), options.max_backups);
        Self {
            paths,
            session,
            lock,
            backups,
            options,
            db: Mutex::new(None),
        }
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    pub fn backup_store(&self) -> &BackupStore {
        &self.backups
    }

    /// The backend present on disk, if any.
    pub fn detect_backend(&self) -> Option<BackendKind> {
        if Database::exists(&self.paths.database()) {
            Some(BackendKind::Relational)
        } else if self.paths.vault_file().is_file() {
            Some(BackendKind::File)
        } else {
            None
        }
    }

    /// The backend the next call will use.
    pub fn backend_kind(&self) -> BackendKind {
        self.detect_backend().unwrap_or(match self.options.new_vault_backend {
            StorageBackend::File => BackendKind::File,
            StorageBackend::Relational => BackendKind::Relational,
        })
    }

    /// Whether writes through the active backend snapshot the previous
    /// contents on their own.
    pub fn writes_back_up(&self) -> bool {
        self.options.auto_backup && self.backend_kind() == BackendKind::File
    }

    /// Resolve the active backend, opening the database lazily.
    ///
    /// Requires a live session even for relational reads.
    pub async fn active_store(&self) -> Result<ActiveStore, CofferError> {
        let key = self.session.encryption_key()?;
        match self.backend_kind() {
            BackendKind::File => Ok(ActiveStore::File(self.file_store())),
            BackendKind::Relational => {
                let mut slot = self.db.lock().await;
                if let Some(store) = slot.as_ref() {
                    return Ok(ActiveStore::Relational(store.clone()));
                }
                let db = Database::open(&self.paths.database(), &key).await?;
                let store = SqliteCredentialStore::new(db);
                *slot = Some(store.clone());
                Ok(ActiveStore::Relational(store))
            }
        }
    }

    /// A flat-file store over this data directory.
    pub fn file_store(&self) -> FileCredentialStore {
        let auto = self.options.auto_backup.then(|| self.backups.clone());
        FileCredentialStore::new(self.paths.clone(), self.session.clone(), auto)
    }

    /// Open (creating if needed) the database under `key` and cache it.
    pub async fn open_database(&self, key: &[u8; 32]) -> Result<SqliteCredentialStore, CofferError> {
        let mut slot = self.db.lock().await;
        if let Some(open) = slot.take() {
            open.database().close().await?;
        }
        let store = SqliteCredentialStore::new(Database::open(&self.paths.database(), key).await?);
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Close the cached database handle, if any.
    pub async fn close_database(&self) -> Result<(), CofferError> {
        if let Some(store) = self.db.lock().await.take() {
            store.database().close().await?;
            debug!("repository database handle closed");
        }
        Ok(())
    }

    /// Close and delete the database files.
    pub async fn delete_database(&self) -> Result<(), CofferError> {
        self.close_database().await?;
        Database::delete_files(&self.paths.database())?;
        info!(path = %self.paths.database().display(), "database deleted");
        Ok(())
    }

    pub async fn find_all(&self) -> Result<Vec<PasswordEntry>, CofferError> {
        self.active_store().await?.as_dyn().find_all().await
    }

    pub async fn find_by_service(&self, service: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        self.active_store().await?.as_dyn().find_by_service(service).await
    }

    pub async fn find_by_service_and_identifier(
        &self,
        service: &str,
        identifier: &str,
    ) -> Result<Option<PasswordEntry>, CofferError> {
        self.active_store()
            .await?
            .as_dyn()
            .find_by_service_and_identifier(service, identifier)
            .await
    }

    pub async fn search(&self, needle: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        self.active_store().await?.as_dyn().search(needle).await
    }

    pub async fn count(&self) -> Result<usize, CofferError> {
        self.active_store().await?.as_dyn().count().await
    }

    /// Insert a new entry; `DuplicateIdentifier` if the pair exists.
    pub async fn create(&self, entry: &PasswordEntry) -> Result<(), CofferError> {
        let store = self.active_store().await?;
        let _guard = self.lock.guard().await?;
        store.as_dyn().create(entry).await?;
        debug!(service = %entry.service, "entry created");
        Ok(())
    }

    /// Modify or rename an entry.
    pub async fn update(&self, update: &EntryUpdate) -> Result<PasswordEntry, CofferError> {
        let store = self.active_store().await?;
        let _guard = self.lock.guard().await?;
        store.as_dyn().update(update).await
    }

    /// Delete an entry, returning whether it existed.
    pub async fn delete(&self, service: &str, identifier: &str) -> Result<bool, CofferError> {
        let store = self.active_store().await?;
        let _guard = self.lock.guard().await?;
        store.as_dyn().delete(service, identifier).await
    }

    /// Stamp `last_accessed` on an entry.
    pub async fn record_access(&self, service: &str, identifier: &str) -> Result<(), CofferError> {
        let store = self.active_store().await?;
        let _guard = self.lock.guard().await?;
        store.as_dyn().record_access(service, identifier).await
    }

    /// Replace the whole vault contents under the lock.
    pub async fn write_all(&self, entries: &[PasswordEntry]) -> Result<(), CofferError> {
        let _guard = self.lock.guard().await?;
        self.write_all_unlocked(entries).await
    }

    /// Replace the whole vault contents. The caller must hold the lock.
    pub async fn write_all_unlocked(&self, entries: &[PasswordEntry]) -> Result<(), CofferError> {
        self.active_store().await?.as_dyn().replace_all(entries).await?;
        debug!(entries = entries.len(), "vault contents replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_config::model::LockConfig;
    use std::time::Duration;
    use zeroize::Zeroizing;

    fn setup(backend: StorageBackend) -> (VaultRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        paths.ensure().unwrap();
        let session = SessionHandle::new(Duration::from_secs(60));
        session.begin(Zeroizing::new([4u8; 32]), "pw".to_string().into());
        let lock = LockManager::new(
            paths.lock_file(),
            &LockConfig {
                stale_timeout_ms: 10_000,
                retry_interval_ms: 5,
                max_retries: 3,
            },
        );
        let options = RepositoryOptions {
            new_vault_backend: backend,
            auto_backup: false,
            max_backups: 10,
        };
        (VaultRepository::new(paths, session, lock, options), dir)
    }

    #[tokio::test]
    async fn new_vault_uses_configured_backend() {
        let (repo, _dir) = setup(StorageBackend::Relational);
        assert_eq!(repo.detect_backend(), None);
        repo.create(&PasswordEntry::new("Mail", "a", "s")).await.unwrap();
        assert_eq!(repo.detect_backend(), Some(BackendKind::Relational));

        let (repo, _dir) = setup(StorageBackend::File);
        repo.create(&PasswordEntry::new("Mail", "a", "s")).await.unwrap();
        assert_eq!(repo.detect_backend(), Some(BackendKind::File));
    }

    #[tokio::test]
    async fn crud_through_relational_backend() {
        let (repo, _dir) = setup(StorageBackend::Relational);
        repo.create(&PasswordEntry::new("Mail", "a", "s")).await.unwrap();
        repo.create(&PasswordEntry::new("Chat", "b", "t")).await.unwrap();
        assert_eq!(repo.search("mai").await.unwrap().len(), 1);
        repo.update(&EntryUpdate::rename("Mail", "a", "z")).await.unwrap();
        assert!(repo.find_by_service_and_identifier("Mail", "z").await.unwrap().is_some());
        assert!(repo.delete("Chat", "b").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(!repo.lock_manager().is_locked());
    }

    #[tokio::test]
    async fn mutations_fail_while_lock_is_held() {
        let (repo, _dir) = setup(StorageBackend::File);
        assert!(repo.lock_manager().acquire(1).await.unwrap());
        let err = repo
            .create(&PasswordEntry::new("Mail", "a", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, CofferError::PermissionDenied(_)));
        // Reads bypass the lock.
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_session_blocks_relational_reads() {
        let (repo, _dir) = setup(StorageBackend::Relational);
        repo.create(&PasswordEntry::new("Mail", "a", "s")).await.unwrap();
        repo.session().end();
        let err = repo.find_all().await.unwrap_err();
        assert!(matches!(err, CofferError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn delete_database_removes_files() {
        let (repo, _dir) = setup(StorageBackend::Relational);
        repo.create(&PasswordEntry::new("Mail", "a", "s")).await.unwrap();
        repo.delete_database().await.unwrap();
        assert_eq!(repo.detect_backend(), None);
    }
}
