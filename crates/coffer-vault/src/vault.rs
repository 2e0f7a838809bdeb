// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault lifecycle: set up, unlock, store and read entries, migrate, back up,
//! and rotate the master password.
//!
//! Every stored password is itself an envelope under the session key, so a
//! master-password change re-seals each entry, the container, and every
//! retained backup before the new key takes over.

use std::path::PathBuf;
use std::sync::Arc;

use coffer_config::model::CofferConfig;
use coffer_core::{CofferError, EntryUpdate, PasswordEntry, SecretStore};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::auth::Authenticator;
use crate::backup::{self, BackupInfo, BackupManager, BackupSnapshot, RecoverySource};
use crate::crypto::KEY_LEN;
use crate::envelope;
use crate::file_store::FileCredentialStore;
use crate::integrity::{self, IntegrityReport};
use crate::legacy::UnsealedPasswords;
use crate::lock::LockManager;
use crate::migration::{MigrationEngine, MigrationOutcome};
use crate::paths::{self, VaultPaths};
use crate::record::MasterPasswordRecord;
use crate::repository::{ActiveStore, RepositoryOptions, VaultRepository};
use crate::session::SessionHandle;

/// An opened data directory plus its authentication material.
///
/// Debug output omits all key material.
pub struct Vault {
    auth: Authenticator,
    repo: Arc<VaultRepository>,
    backups: BackupManager,
    migrations: MigrationEngine,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.repo.paths().root())
            .field("secret_store", &self.auth.store().name())
            .field("unlocked", &self.repo.session().is_active())
            .finish()
    }
}

impl Vault {
    /// Prepare the data directory named by `config`. Nothing is decrypted yet.
    pub fn open(config: &CofferConfig, secrets: Arc<dyn SecretStore>) -> Result<Self, CofferError> {
        let paths = VaultPaths::new(PathBuf::from(&config.storage.data_dir));
        paths.ensure()?;
        let session = SessionHandle::new(config.session.timeout());
        let lock = LockManager::new(paths.lock_file(), &config.lock);
        let repo = Arc::new(VaultRepository::new(
            paths,
            session,
            lock,
            RepositoryOptions {
                new_vault_backend: config.storage.new_vault_backend,
                auto_backup: config.backup.auto_backup,
                max_backups: config.backup.max_backups,
            },
        ));
        debug!(root = %repo.paths().root().display(), "vault opened");
        Ok(Self {
            auth: Authenticator::new(secrets),
            backups: BackupManager::new(repo.clone()),
            migrations: MigrationEngine::new(repo.clone()),
            repo,
        })
    }

    pub fn repository(&self) -> &Arc<VaultRepository> {
        &self.repo
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn session(&self) -> &SessionHandle {
        self.repo.session()
    }

    pub async fn is_initialized(&self) -> Result<bool, CofferError> {
        self.auth.is_initialized().await
    }

    /// First-time setup. Starts a session and returns the hex recovery key,
    /// which is not shown again.
    pub async fn setup(&self, password: &SecretString) -> Result<SecretString, CofferError> {
        if self.auth.is_initialized().await? {
            return Err(CofferError::AuthenticationFailed(
                "vault is already set up".to_string(),
            ));
        }
        let outcome = self.auth.setup_master_password(password).await?;
        {
            let _guard = self.repo.lock_manager().guard().await?;
            MasterPasswordRecord::new().save(&self.repo.paths().master_record(), &outcome.key)?;
        }
        self.repo.session().begin(outcome.key, password.clone());
        info!("vault set up");
        Ok(outcome.recovery_key)
    }

    /// Verify `password` and start a session. A wrong password is
    /// `AuthenticationFailed`.
    pub async fn unlock(&self, password: &SecretString) -> Result<(), CofferError> {
        match self.auth.try_unlock(password).await? {
            Some(key) => {
                self.repo.session().begin(key, password.clone());
                info!("vault unlocked");
                Ok(())
            }
            None => Err(CofferError::AuthenticationFailed(
                "incorrect master password".to_string(),
            )),
        }
    }

    /// End the session and scrub cached key material.
    pub fn lock(&self) {
        self.repo.session().end();
    }

    pub fn is_unlocked(&self) -> bool {
        self.repo.session().is_active()
    }

    /// Store a new entry, sealing `password` under the session key.
    pub async fn add_entry(
        &self,
        service: &str,
        identifier: &str,
        password: &SecretString,
    ) -> Result<PasswordEntry, CofferError> {
        let key = self.repo.session().encryption_key()?;
        let sealed = envelope::encrypt_password(password.expose_secret(), &key)?;
        let entry = PasswordEntry::new(service, identifier, sealed);
        self.repo.create(&entry).await?;
        info!(service, "entry added");
        Ok(entry)
    }

    /// Decrypt the password of one entry and stamp its access time.
    pub async fn get_password(
        &self,
        service: &str,
        identifier: &str,
    ) -> Result<SecretString, CofferError> {
        let key = self.repo.session().encryption_key()?;
        let entry = self
            .repo
            .find_by_service_and_identifier(service, identifier)
            .await?
            .ok_or_else(|| CofferError::NotFound(format!("`{service}` / `{identifier}`")))?;
        let password = envelope::decrypt_password(&entry.encrypted_password, &key)?;
        if let Err(e) = self.repo.record_access(service, identifier).await {
            warn!(error = %e, "could not record access time");
        }
        Ok(password)
    }

    pub async fn list_entries(&self) -> Result<Vec<PasswordEntry>, CofferError> {
        self.repo.find_all().await
    }

    pub async fn find_by_service(&self, service: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        self.repo.find_by_service(service).await
    }

    pub async fn search(&self, needle: &str) -> Result<Vec<PasswordEntry>, CofferError> {
        self.repo.search(needle).await
    }

    /// Replace the password of an existing entry.
    pub async fn update_password(
        &self,
        service: &str,
        identifier: &str,
        password: &SecretString,
    ) -> Result<PasswordEntry, CofferError> {
        let key = self.repo.session().encryption_key()?;
        let sealed = envelope::encrypt_password(password.expose_secret(), &key)?;
        self.repo
            .update(&EntryUpdate::password(service, identifier, sealed))
            .await
    }

    pub async fn rename_entry(
        &self,
        service: &str,
        from: &str,
        to: &str,
    ) -> Result<PasswordEntry, CofferError> {
        self.repo.update(&EntryUpdate::rename(service, from, to)).await
    }

    /// Remove an entry, returning whether it existed.
    pub async fn remove_entry(&self, service: &str, identifier: &str) -> Result<bool, CofferError> {
        let removed = self.repo.delete(service, identifier).await?;
        if removed {
            info!(service, "entry removed");
        }
        Ok(removed)
    }

    pub async fn migrate(
        &self,
        confirm_overwrite: &dyn Fn(&str) -> bool,
        unsealed: UnsealedPasswords,
    ) -> Result<MigrationOutcome, CofferError> {
        self.migrations.migrate(confirm_overwrite, unsealed).await
    }

    pub async fn rollback(&self) -> Result<(), CofferError> {
        self.migrations.rollback().await
    }

    pub async fn create_backup(&self) -> Result<BackupInfo, CofferError> {
        self.backups.create_backup(false).await
    }

    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CofferError> {
        self.backups.list_backups()
    }

    pub async fn recover_database(&self) -> Result<RecoverySource, CofferError> {
        self.backups.recover_database().await
    }

    pub async fn check_integrity(&self) -> IntegrityReport {
        integrity::check_integrity(&self.repo, &self.auth).await
    }

    /// Re-import the application secret from its recovery key.
    pub async fn restore_recovery_key(&self, recovery_key: &SecretString) -> Result<(), CofferError> {
        self.auth.restore_recovery_key(recovery_key).await
    }

    /// Destroy the application secret and hash, ending the session.
    pub async fn wipe_credentials(&self) -> Result<(), CofferError> {
        self.repo.session().end();
        self.auth.wipe_credentials().await
    }

    /// Rotate the master password.
    ///
    /// Re-seals every entry, the active container, and each retained backup
    /// under the new key, then rotates the master-password record and
    /// restarts the session. If re-encryption fails, the stored hash is put
    /// back to the current password.
    pub async fn change_master_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), CofferError> {
        let old_key = self.auth.try_unlock(current).await?.ok_or_else(|| {
            CofferError::AuthenticationFailed("current master password is incorrect".to_string())
        })?;
        self.repo.session().begin(Zeroizing::new(*old_key), current.clone());

        let _guard = self.repo.lock_manager().guard().await?;
        let has_vault = self.repo.detect_backend().is_some();
        let entries = if has_vault {
            self.repo.find_all().await?
        } else {
            Vec::new()
        };
        let backups = self.load_backups(&old_key)?;
        let record = MasterPasswordRecord::load(&self.repo.paths().master_record(), &old_key)
            .unwrap_or_else(|e| {
                warn!(error = %e, "master-password record unreadable; starting a new one");
                None
            })
            .unwrap_or_default();

        let new_key = self.auth.update_hash(new).await?;
        let result = self
            .reencrypt(has_vault, &entries, &backups, &old_key, &new_key, current, new)
            .await;
        if let Err(e) = result {
            warn!(error = %e, "re-encryption failed; restoring previous password");
            self.repo.session().begin(old_key, current.clone());
            if let Err(restore) = self.auth.update_hash(current).await {
                warn!(error = %restore, "could not restore previous authentication hash");
            }
            return Err(e);
        }

        self.repo.session().begin(Zeroizing::new(*new_key), new.clone());
        if let Err(e) = record
            .rotated()
            .save(&self.repo.paths().master_record(), &new_key)
        {
            warn!(error = %e, "master-password record not rotated");
        }
        info!(
            entries = entries.len(),
            backups = backups.len(),
            "master password changed"
        );
        Ok(())
    }

    fn load_backups(
        &self,
        key: &[u8; KEY_LEN],
    ) -> Result<Vec<(PathBuf, BackupSnapshot)>, CofferError> {
        let store = self.repo.backup_store();
        let mut out = Vec::new();
        for info in store.list()? {
            match store.read(&info.path, key) {
                Ok(snapshot) => out.push((info.path, snapshot)),
                Err(e) => warn!(file = %info.file_name, error = %e, "backup left under previous key"),
            }
        }
        Ok(out)
    }

    /// Move the vault and its backups from `old_key` to `new_key`.
    ///
    /// Backups are staged in temp files first. The vault is rewritten next,
    /// and the staged backups are renamed into place last. A failure at any
    /// step leaves everything under `old_key`.
    #[allow(clippy::too_many_arguments)]
    async fn reencrypt(
        &self,
        has_vault: bool,
        entries: &[PasswordEntry],
        backups: &[(PathBuf, BackupSnapshot)],
        old_key: &[u8; KEY_LEN],
        new_key: &[u8; KEY_LEN],
        current_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), CofferError> {
        let resealed = reseal(entries, old_key, new_key)?;
        let staged = stage_backups(backups, old_key, new_key)?;

        if has_vault {
            if let Err(e) = self
                .rewrite_vault(&resealed, old_key, new_key, new_password)
                .await
            {
                discard_staged(&staged);
                return Err(e);
            }
        }

        if let Err(e) = commit_staged(&staged) {
            if has_vault {
                if let Err(undo) = self
                    .rewrite_vault(entries, new_key, old_key, current_password)
                    .await
                {
                    warn!(error = %undo, "vault could not be returned to the previous key");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Replace the active vault's contents with `entries` sealed under `to`.
    /// The live session is not touched.
    async fn rewrite_vault(
        &self,
        entries: &[PasswordEntry],
        from: &[u8; KEY_LEN],
        to: &[u8; KEY_LEN],
        to_password: &SecretString,
    ) -> Result<(), CofferError> {
        match self.repo.active_store().await? {
            ActiveStore::Relational(store) => {
                store.database().rekey(to).await?;
                if let Err(e) =
                    coffer_storage::queries::passwords::replace_all(store.database(), entries).await
                {
                    store.database().rekey(from).await?;
                    return Err(e);
                }
            }
            ActiveStore::File(_) => {
                let session = SessionHandle::new(self.repo.session().timeout());
                session.begin(Zeroizing::new(*to), to_password.clone());
                FileCredentialStore::new(self.repo.paths().clone(), session, None)
                    .write_entries(entries)?;
            }
        }
        Ok(())
    }
}

/// A backup re-sealed under the new key, waiting in a temp file.
struct StagedBackup {
    path: PathBuf,
    tmp: PathBuf,
    original: Vec<u8>,
}

fn stage_backups(
    backups: &[(PathBuf, BackupSnapshot)],
    old_key: &[u8; KEY_LEN],
    new_key: &[u8; KEY_LEN],
) -> Result<Vec<StagedBackup>, CofferError> {
    let mut staged = Vec::with_capacity(backups.len());
    for (path, snapshot) in backups {
        match stage_backup(path, snapshot, old_key, new_key) {
            Ok(item) => staged.push(item),
            Err(e) => {
                discard_staged(&staged);
                return Err(e);
            }
        }
    }
    Ok(staged)
}

fn stage_backup(
    path: &std::path::Path,
    snapshot: &BackupSnapshot,
    old_key: &[u8; KEY_LEN],
    new_key: &[u8; KEY_LEN],
) -> Result<StagedBackup, CofferError> {
    let original =
        std::fs::read(path).map_err(|e| CofferError::io(format!("reading {}", path.display()), e))?;
    let mut rotated = BackupSnapshot::new(snapshot.backend, reseal(&snapshot.entries, old_key, new_key)?)?;
    rotated.created_at = snapshot.created_at.clone();
    let sealed = backup::seal_snapshot(&rotated, new_key)?;
    let tmp = path.with_extension("enc.tmp");
    if let Err(e) = paths::write_private(&tmp, &sealed) {
        remove_temp(&tmp);
        return Err(e);
    }
    Ok(StagedBackup {
        path: path.to_path_buf(),
        tmp,
        original,
    })
}

/// Rename staged backups over the originals. On failure the ones already
/// replaced get their original bytes back.
fn commit_staged(staged: &[StagedBackup]) -> Result<(), CofferError> {
    for (done, item) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(&item.tmp, &item.path) {
            for undo in &staged[..done] {
                if let Err(e) = paths::write_private(&undo.path, &undo.original) {
                    warn!(file = %undo.path.display(), error = %e, "backup left under new key");
                }
            }
            discard_staged(&staged[done..]);
            return Err(CofferError::io(format!("replacing {}", item.path.display()), e));
        }
    }
    Ok(())
}

fn discard_staged(staged: &[StagedBackup]) {
    for item in staged {
        remove_temp(&item.tmp);
    }
}

fn remove_temp(tmp: &std::path::Path) {
    if !tmp.is_file() {
        return;
    }
    if let Err(e) = std::fs::remove_file(tmp) {
        warn!(file = %tmp.display(), error = %e, "temp file left behind");
    }
}

/// Decrypt each entry's password under `old` and seal it under `new`.
fn reseal(
    entries: &[PasswordEntry],
    old: &[u8; KEY_LEN],
    new: &[u8; KEY_LEN],
) -> Result<Vec<PasswordEntry>, CofferError> {
    entries
        .iter()
        .map(|entry| {
            let password = envelope::decrypt_password(&entry.encrypted_password, old)?;
            Ok(PasswordEntry {
                encrypted_password: envelope::encrypt_password(password.expose_secret(), new)?,
                ..entry.clone()
            })
        })
        .collect()
}
