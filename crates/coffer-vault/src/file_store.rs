// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat-file backend: the whole entry list as one envelope-encoded JSON array.
//!
//! Writes go to a temporary file that is synced and then renamed over the
//! live file, so readers see either the old or the new vault. The previous
//! file is copied to `vault.dat.bak` first.

use async_trait::async_trait;
use coffer_core::{
    BackendKind, CofferError, CredentialStore, EntryUpdate, HealthStatus, PasswordEntry,
    timestamp_now,
};
use tracing::{debug, warn};

use crate::backup::{BackupSnapshot, BackupStore};
use crate::envelope::{self, ContentType};
use crate::paths::{self, VaultPaths};
use crate::session::SessionHandle;

/// Envelope-backed credential store over `vault.dat`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    paths: VaultPaths,
    session: SessionHandle,
    auto_backup: Option<BackupStore>,
}

impl FileCredentialStore {
    /// A store that snapshots the previous contents into `auto_backup`
    /// before every write, when given.
    pub fn new(paths: VaultPaths, session: SessionHandle, auto_backup: Option<BackupStore>) -> Self {
        Self {
            paths,
            session,
            auto_backup,
        }
    }

    /// Whether the vault file exists.
    pub fn exists(&self) -> bool {
        self.paths.vault_file().is_file()
    }

    /// Decode the whole vault. A missing file is an empty vault.
    pub fn read_entries(&self) -> Result<Vec<PasswordEntry>, CofferError> {
        let key = self.session.encryption_key()?;
        let path = self.paths.vault_file();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CofferError::io(format!("reading {}", path.display()), e)),
        };
        let plaintext = envelope::decode(&bytes, &key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CofferError::FileCorrupted(format!("vault contents are not valid JSON: {e}")))
    }

    /// Encode and atomically replace the vault file.
    pub fn write_entries(&self, entries: &[PasswordEntry]) -> Result<(), CofferError> {
        let key = self.session.encryption_key()?;
        let json = zeroize::Zeroizing::new(
            serde_json::to_vec(entries)
                .map_err(|e| CofferError::Internal(format!("serializing vault: {e}")))?,
        );
        let sealed = envelope::encode(&json, &key, ContentType::Vault)?;

        let live = self.paths.vault_file();
        if live.is_file() {
            self.snapshot_previous();
        }

        let tmp = self.paths.vault_tmp();
        paths::write_private(&tmp, &sealed)?;
        if live.is_file() {
            std::fs::copy(&live, self.paths.vault_bak()).map_err(|e| {
                CofferError::io(format!("copying {} to backup", live.display()), e)
            })?;
        }
        std::fs::rename(&tmp, &live)
            .map_err(|e| CofferError::io(format!("replacing {}", live.display()), e))?;
        debug!(entries = entries.len(), "vault file written");
        Ok(())
    }

    fn snapshot_previous(&self) {
        let Some(store) = &self.auto_backup else {
            return;
        };
        let result = self.session.encryption_key().and_then(|key| {
            let previous = self.read_entries()?;
            store.write_snapshot(&BackupSnapshot::new(BackendKind::File, previous)?, &key)
        });
        if let Err(e) = result {
            warn!(error = %e, "automatic backup before write failed");
        }
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<PasswordEntry>) -> Result<T, CofferError>,
    ) -> Result<T, CofferError> {
        let mut entries = self.read_entries()?;
        let out = f(&mut entries)?;
        self.write_entries(&entries)?;
        Ok(out)
    }
}

fn sorted(mut entries: Vec<PasswordEntry>) -> Vec<PasswordEntry> {
    entries.sort_by(|a, b| (&a.service, &a.identifier).cmp(&(&b.service, &b.identifier)));
    entries
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    async fn health_check(&self) -> Result<HealthStatus, CofferError> {
        if !self.exists() {
            return Ok(HealthStatus::Degraded("vault file does not exist yet".to_string()));
        }
        Ok(match self.read_entries() {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn find_all(&self) -> Result<Vec<PasswordEntry>, CofferError> {
        Ok(sorted(self.read_entries()?))
    }

    async fn create(&self, entry: &PasswordEntry) -> Result<(), CofferError> {
        self.mutate(|entries| {
            if entries.iter().any(|e| e.matches(&entry.service, &entry.identifier)) {
                return Err(CofferError::DuplicateIdentifier {
                    service: entry.service.clone(),
                    identifier: entry.identifier.clone(),
                });
            }
            entries.push(entry.clone());
            Ok(())
        })
    }

    async fn update(&self, update: &EntryUpdate) -> Result<PasswordEntry, CofferError> {
        self.mutate(|entries| {
            if update.is_rename()
                && entries
                    .iter()
                    .any(|e| e.matches(&update.service, &update.identifier))
            {
                return Err(CofferError::DuplicateIdentifier {
                    service: update.service.clone(),
                    identifier: update.identifier.clone(),
                });
            }
            let entry = entries
                .iter_mut()
                .find(|e| e.matches(&update.service, update.current_identifier()))
                .ok_or_else(|| {
                    CofferError::NotFound(format!(
                        "{} / {}",
                        update.service,
                        update.current_identifier()
                    ))
                })?;
            update.apply_to(entry);
            Ok(entry.clone())
        })
    }

    async fn delete(&self, service: &str, identifier: &str) -> Result<bool, CofferError> {
        let mut entries = self.read_entries()?;
        let before = entries.len();
        entries.retain(|e| !e.matches(service, identifier));
        if entries.len() == before {
            return Ok(false);
        }
        self.write_entries(&entries)?;
        Ok(true)
    }

    async fn record_access(&self, service: &str, identifier: &str) -> Result<(), CofferError> {
        self.mutate(|entries| {
            let entry = entries
                .iter_mut()
                .find(|e| e.matches(service, identifier))
                .ok_or_else(|| CofferError::NotFound(format!("{service} / {identifier}")))?;
            entry.last_accessed = Some(timestamp_now());
            Ok(())
        })
    }

    async fn replace_all(&self, entries: &[PasswordEntry]) -> Result<(), CofferError> {
        self.write_entries(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use zeroize::Zeroizing;

    fn setup(auto_backup: bool) -> (FileCredentialStore, VaultPaths, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        paths.ensure().unwrap();
        let session = SessionHandle::new(Duration::from_secs(60));
        session.begin(Zeroizing::new([8u8; 32]), "pw".to_string().into());
        let backups = auto_backup.then(|| BackupStore::new(paths.backup_dir(), 10));
        (
            FileCredentialStore::new(paths.clone(), session, backups),
            paths,
            dir,
        )
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let (store, _paths, _dir) = setup(false);
        assert!(store.find_all().await.unwrap().is_empty());

        store.create(&PasswordEntry::new("Mail", "a@b.com", "s1")).await.unwrap();
        store.create(&PasswordEntry::new("Bank", "me", "s2")).await.unwrap();
        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].service, "Bank");

        let err = store
            .create(&PasswordEntry::new("Mail", "a@b.com", "s3"))
            .await
            .unwrap_err();
        assert!(matches!(err, CofferError::DuplicateIdentifier { .. }));

        let renamed = store
            .update(&EntryUpdate::rename("Mail", "a@b.com", "c@d.com"))
            .await
            .unwrap();
        assert_eq!(renamed.encrypted_password, "s1");
        assert!(store.find_by_service_and_identifier("Mail", "a@b.com").await.unwrap().is_none());

        store.record_access("Mail", "c@d.com").await.unwrap();
        let hit = store.find_by_service_and_identifier("Mail", "c@d.com").await.unwrap().unwrap();
        assert!(hit.last_accessed.is_some());

        assert!(store.delete("Bank", "me").await.unwrap());
        assert!(!store.delete("Bank", "me").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn writes_keep_previous_file_as_bak() {
        let (store, paths, _dir) = setup(false);
        store.create(&PasswordEntry::new("A", "1", "x")).await.unwrap();
        assert!(!paths.vault_bak().exists());
        store.create(&PasswordEntry::new("B", "2", "y")).await.unwrap();
        assert!(paths.vault_bak().exists());
        assert!(!paths.vault_tmp().exists());
        assert!(envelope::is_envelope(&std::fs::read(paths.vault_file()).unwrap()));
    }

    #[tokio::test]
    async fn auto_backup_snapshots_previous_contents() {
        let (store, paths, _dir) = setup(true);
        store.create(&PasswordEntry::new("A", "1", "x")).await.unwrap();
        store.create(&PasswordEntry::new("B", "2", "y")).await.unwrap();
        let backups = BackupStore::new(paths.backup_dir(), 10).list().unwrap();
        assert_eq!(backups.len(), 1);
        let snapshot = BackupStore::new(paths.backup_dir(), 10)
            .read(&backups[0].path, &[8u8; 32])
            .unwrap();
        assert_eq!(snapshot.entries.len(), 1);
    }

    #[tokio::test]
    async fn operations_require_a_session_key() {
        let (store, _paths, _dir) = setup(false);
        store.session.end();
        let err = store.find_all().await.unwrap_err();
        assert!(matches!(err, CofferError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn plaintext_file_is_rejected() {
        let (store, paths, _dir) = setup(false);
        std::fs::write(paths.vault_file(), b"[]").unwrap();
        let err = store.find_all().await.unwrap_err();
        assert!(matches!(err, CofferError::InvalidEncryptionFormat(_)));
        assert!(matches!(
            store.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
