// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-way, verified migration from the flat file to the relational store.
//!
//! The saga runs under the vault lock. Until verification passes the legacy
//! file is never modified, and a failed attempt deletes the partially built
//! database, so the data directory ends up either unchanged or fully
//! migrated.

use std::path::PathBuf;
use std::sync::Arc;

use coffer_core::{BackendKind, CofferError, CredentialStore, PasswordEntry};
use coffer_storage::SqliteCredentialStore;
use coffer_storage::queries::passwords;
use rand::seq::SliceRandom;
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::backup::{BackupManager, BackupSnapshot, RecoverySource};
use crate::crypto::KEY_LEN;
use crate::envelope;
use crate::legacy::{self, LegacyFormat, UnsealedPasswords};
use crate::repository::VaultRepository;

/// Rows decrypted and compared during verification.
const VERIFY_SAMPLE: usize = 5;

/// Report of what a successful migration did.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Shape of the legacy file.
    pub format: Option<LegacyFormat>,
    /// Rows written to the relational store.
    pub migrated: usize,
    /// Rows decrypted and compared against the source.
    pub verified_samples: usize,
    /// Pre-migration snapshot, if it could be written.
    pub snapshot: Option<PathBuf>,
    /// Whether the legacy file was renamed to its archived form.
    pub archived: bool,
    /// Non-fatal problems (snapshot or archive failures).
    pub warnings: Vec<String>,
}

/// Terminal state of [`MigrationEngine::migrate`].
#[derive(Debug)]
pub enum MigrationOutcome {
    Migrated(MigrationReport),
    Aborted(String),
    /// No legacy file, but the store was rebuilt from the archive or a backup.
    Recovered(RecoverySource),
}

/// Test hook applied to the freshly populated store before verification.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
enum Fault {
    CorruptPassword,
    DropRow,
}

/// Drives migration and rollback.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    repo: Arc<VaultRepository>,
    backups: BackupManager,
    #[cfg(test)]
    fault: Option<Fault>,
}

impl MigrationEngine {
    pub fn new(repo: Arc<VaultRepository>) -> Self {
        let backups = BackupManager::new(repo.clone());
        Self {
            repo,
            backups,
            #[cfg(test)]
            fault: None,
        }
    }

    /// Move the flat-file vault into the relational store.
    ///
    /// `confirm_overwrite` is asked before a populated database without an
    /// archive is discarded; declining aborts. `unsealed` decides whether
    /// password fields that are not sealed envelopes are refused or taken
    /// as plaintext.
    pub async fn migrate(
        &self,
        confirm_overwrite: &dyn Fn(&str) -> bool,
        unsealed: UnsealedPasswords,
    ) -> Result<MigrationOutcome, CofferError> {
        let key = self.repo.session().encryption_key()?;
        let _guard = self.repo.lock_manager().guard().await?;
        let paths = self.repo.paths().clone();

        if let Some(reason) = self.settle_existing_database(&key, confirm_overwrite).await? {
            info!(%reason, "migration aborted");
            return Ok(MigrationOutcome::Aborted(reason));
        }

        let legacy_path = paths.vault_file();
        if !legacy_path.is_file() {
            if paths.archive().is_file() {
                info!("no flat file but an archive exists; recovering");
                let source = self.backups.recover_database_unlocked().await?;
                return Ok(MigrationOutcome::Recovered(source));
            }
            return Ok(MigrationOutcome::Aborted("no flat-file vault to migrate".to_string()));
        }

        let bytes = std::fs::read(&legacy_path)
            .map_err(|e| CofferError::io(format!("reading {}", legacy_path.display()), e))?;
        let (format, entries) = legacy::parse(&bytes, &key, unsealed)
            .map_err(|e| CofferError::MigrationFailed(format!("legacy vault unreadable: {e}")))?;

        let mut report = MigrationReport {
            format: Some(format),
            ..MigrationReport::default()
        };
        let snapshot = BackupSnapshot::new(BackendKind::File, entries.clone());
        match snapshot.and_then(|snapshot| self.repo.backup_store().write_snapshot(&snapshot, &key)) {
            Ok(info) => report.snapshot = Some(info.path),
            Err(e) => {
                warn!(error = %e, "pre-migration snapshot failed");
                report.warnings.push(format!("pre-migration snapshot failed: {e}"));
            }
        }

        match self.populate_and_verify(&entries, &key).await {
            Ok(samples) => {
                report.migrated = entries.len();
                report.verified_samples = samples;
            }
            Err(e) => {
                warn!(error = %e, "migration failed; discarding new database");
                self.repo.delete_database().await?;
                return Err(match e {
                    CofferError::DatabaseIntegrityFailed(_) | CofferError::MigrationFailed(_) => e,
                    other => CofferError::MigrationFailed(other.to_string()),
                });
            }
        }

        match std::fs::rename(&legacy_path, paths.archive()) {
            Ok(()) => report.archived = true,
            Err(e) => {
                warn!(error = %e, "could not archive flat file");
                report.warnings.push(format!("flat file was not archived: {e}"));
            }
        }

        info!(
            migrated = report.migrated,
            samples = report.verified_samples,
            archived = report.archived,
            "migration complete"
        );
        Ok(MigrationOutcome::Migrated(report))
    }

    /// Deal with a database left over from an earlier run. Returns an abort
    /// reason, or `None` when migration may proceed on a clean slate.
    async fn settle_existing_database(
        &self,
        key: &[u8; KEY_LEN],
        confirm_overwrite: &dyn Fn(&str) -> bool,
    ) -> Result<Option<String>, CofferError> {
        let paths = self.repo.paths();
        if !coffer_storage::Database::exists(&paths.database()) {
            return Ok(None);
        }

        let rows = match self.count_rows(key).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "existing database is unusable; discarding");
                self.repo.delete_database().await?;
                return Ok(None);
            }
        };

        if rows > 0 && paths.archive().is_file() {
            return Ok(Some("vault is already migrated".to_string()));
        }
        if rows > 0 && !confirm_overwrite(&format!(
            "A database with {rows} entries already exists. Overwrite it with the flat-file vault?"
        )) {
            return Ok(Some("overwrite of existing database declined".to_string()));
        }
        self.repo.delete_database().await?;
        Ok(None)
    }

    async fn count_rows(&self, key: &[u8; KEY_LEN]) -> Result<usize, CofferError> {
        let store = self.repo.open_database(key).await?;
        match store.health_check().await? {
            coffer_core::HealthStatus::Healthy => store.count().await,
            coffer_core::HealthStatus::Degraded(m) | coffer_core::HealthStatus::Unhealthy(m) => {
                Err(CofferError::database(m))
            }
        }
    }

    async fn populate_and_verify(
        &self,
        entries: &[PasswordEntry],
        key: &[u8; KEY_LEN],
    ) -> Result<usize, CofferError> {
        let store = self.repo.open_database(key).await?;
        let skipped = passwords::insert_many(store.database(), entries).await?;
        if let Some((service, identifier)) = skipped.first() {
            return Err(CofferError::MigrationFailed(format!(
                "flat file contains `{service}` / `{identifier}` more than once"
            )));
        }
        #[cfg(test)]
        if let Some(fault) = self.fault {
            inject(&store, entries, fault).await?;
        }
        verify(&store, entries, key).await
    }

    /// Undo a migration: drop the database and restore the archived flat file.
    pub async fn rollback(&self) -> Result<(), CofferError> {
        let _guard = self.repo.lock_manager().guard().await?;
        let paths = self.repo.paths();
        let archive = paths.archive();
        if !archive.is_file() {
            return Err(CofferError::RollbackFailed("no archived flat file to restore".to_string()));
        }
        if paths.vault_file().exists() {
            return Err(CofferError::RollbackFailed(
                "an active flat file already exists".to_string(),
            ));
        }
        self.repo
            .delete_database()
            .await
            .map_err(|e| CofferError::RollbackFailed(format!("removing database: {e}")))?;
        std::fs::rename(&archive, paths.vault_file())
            .map_err(|e| CofferError::RollbackFailed(format!("restoring archive: {e}")))?;
        info!("migration rolled back to flat file");
        Ok(())
    }
}

/// Count, sample, and uniqueness checks on the destination. Returns the
/// number of sampled rows.
async fn verify(
    store: &SqliteCredentialStore,
    source: &[PasswordEntry],
    key: &[u8; KEY_LEN],
) -> Result<usize, CofferError> {
    let stored = passwords::count(store.database()).await?;
    if stored != source.len() {
        return Err(CofferError::DatabaseIntegrityFailed(format!(
            "source has {} entries, database has {stored}",
            source.len()
        )));
    }

    let sample: Vec<&PasswordEntry> = source
        .choose_multiple(&mut rand::thread_rng(), VERIFY_SAMPLE)
        .collect();
    for expected in &sample {
        let row = store
            .find_by_service_and_identifier(&expected.service, &expected.identifier)
            .await?
            .ok_or_else(|| {
                CofferError::DatabaseIntegrityFailed(format!(
                    "`{}` / `{}` missing from database",
                    expected.service, expected.identifier
                ))
            })?;
        let integrity = |e: CofferError| {
            CofferError::DatabaseIntegrityFailed(format!(
                "`{}` / `{}` does not decrypt: {e}",
                expected.service, expected.identifier
            ))
        };
        let got = envelope::decrypt_password(&row.encrypted_password, key).map_err(integrity)?;
        let want = envelope::decrypt_password(&expected.encrypted_password, key).map_err(integrity)?;
        if got.expose_secret() != want.expose_secret() {
            return Err(CofferError::DatabaseIntegrityFailed(format!(
                "`{}` / `{}` decrypted to a different password",
                expected.service, expected.identifier
            )));
        }
    }

    let duplicates = passwords::duplicate_pairs(store.database()).await?;
    if !duplicates.is_empty() {
        return Err(CofferError::DatabaseIntegrityFailed(format!(
            "{} duplicate (service, identifier) pairs",
            duplicates.len()
        )));
    }
    Ok(sample.len())
}

#[cfg(test)]
async fn inject(
    store: &SqliteCredentialStore,
    entries: &[PasswordEntry],
    fault: Fault,
) -> Result<(), CofferError> {
    match fault {
        Fault::CorruptPassword => {
            for entry in entries {
                let update = coffer_core::EntryUpdate::password(
                    &entry.service,
                    &entry.identifier,
                    "corrupted",
                );
                passwords::update(store.database(), &update).await?;
            }
        }
        Fault::DropRow => {
            if let Some(entry) = entries.first() {
                passwords::delete(store.database(), &entry.service, &entry.identifier).await?;
            }
        }
    }
    Ok(())
}
