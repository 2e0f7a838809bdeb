// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only integrity checks over a vault's data directory.
//!
//! Checks that need key material are downgraded to structural checks when no
//! session is active.

use std::time::{Duration, Instant};

use coffer_core::{BackendKind, HealthStatus};

use crate::auth::Authenticator;
use crate::envelope::{self, ContentType};
use crate::record::MasterPasswordRecord;
use crate::repository::VaultRepository;

/// Status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

/// All check results for one run.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub checks: Vec<CheckResult>,
}

impl IntegrityReport {
    /// `true` when no check failed. Warnings do not count.
    pub fn ok(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    fn push(&mut self, name: &str, started: Instant, (status, message): (CheckStatus, String)) {
        self.checks.push(CheckResult {
            name: name.to_string(),
            status,
            message,
            duration: started.elapsed(),
        });
    }
}

/// Run every check and collect the results.
pub async fn check_integrity(repo: &VaultRepository, auth: &Authenticator) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    let started = Instant::now();
    report.push("data directory", started, check_data_dir(repo));

    let started = Instant::now();
    let result = match auth.is_initialized().await {
        Ok(true) => (CheckStatus::Pass, format!("present in {}", auth.store().name())),
        Ok(false) => (CheckStatus::Warn, "not set up; run `coffer init`".to_string()),
        Err(e) => (CheckStatus::Fail, format!("secret store unreadable: {e}")),
    };
    report.push("authentication", started, result);

    let started = Instant::now();
    report.push("storage", started, check_storage(repo).await);

    let started = Instant::now();
    report.push("migration state", started, check_migration_state(repo));

    let started = Instant::now();
    let result = if repo.lock_manager().is_locked() {
        (CheckStatus::Warn, "lock marker present; another process may be writing".to_string())
    } else {
        (CheckStatus::Pass, "not held".to_string())
    };
    report.push("lock", started, result);

    let started = Instant::now();
    report.push("master record", started, check_master_record(repo));

    check_backups(repo, &mut report);
    report
}

fn check_data_dir(repo: &VaultRepository) -> (CheckStatus, String) {
    let root = repo.paths().root();
    let meta = match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => meta,
        Ok(_) => return (CheckStatus::Fail, format!("{} is not a directory", root.display())),
        Err(e) => return (CheckStatus::Fail, format!("{}: {e}", root.display())),
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return (
                CheckStatus::Warn,
                format!("{} is accessible by other users (mode {mode:o})", root.display()),
            );
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    (CheckStatus::Pass, root.display().to_string())
}

async fn check_storage(repo: &VaultRepository) -> (CheckStatus, String) {
    let Some(kind) = repo.detect_backend() else {
        return (CheckStatus::Warn, "no vault yet".to_string());
    };
    if !repo.session().is_active() {
        if kind == BackendKind::File {
            return match std::fs::read(repo.paths().vault_file()) {
                Ok(bytes) => match envelope::peek_metadata(&bytes) {
                    Ok(meta) if meta.content_type == ContentType::Vault => {
                        (CheckStatus::Pass, "file backend; envelope header intact".to_string())
                    }
                    Ok(meta) => (
                        CheckStatus::Fail,
                        format!("vault file holds {:?} content", meta.content_type),
                    ),
                    Err(e) => (CheckStatus::Warn, format!("file backend not in envelope form: {e}")),
                },
                Err(e) => (CheckStatus::Fail, format!("vault file unreadable: {e}")),
            };
        }
        return (CheckStatus::Warn, format!("{kind} backend present; unlock to verify contents"));
    }

    let store = match repo.active_store().await {
        Ok(store) => store,
        Err(e) => return (CheckStatus::Fail, format!("{kind} backend cannot be opened: {e}")),
    };
    let store = store.as_dyn();
    match store.health_check().await {
        Ok(HealthStatus::Healthy) => match store.count().await {
            Ok(n) => (CheckStatus::Pass, format!("{kind} backend healthy, {n} entries")),
            Err(e) => (CheckStatus::Fail, format!("{kind} backend unreadable: {e}")),
        },
        Ok(HealthStatus::Degraded(m)) => (CheckStatus::Warn, format!("{kind} backend: {m}")),
        Ok(HealthStatus::Unhealthy(m)) => (CheckStatus::Fail, format!("{kind} backend: {m}")),
        Err(e) => (CheckStatus::Fail, format!("{kind} health probe failed: {e}")),
    }
}

fn check_migration_state(repo: &VaultRepository) -> (CheckStatus, String) {
    let paths = repo.paths();
    let flat = paths.vault_file().is_file();
    let db = paths.database().is_file();
    let archive = paths.archive().is_file();
    match (flat, db, archive) {
        (true, true, _) => (
            CheckStatus::Warn,
            "both a flat file and a database exist; the database is used".to_string(),
        ),
        (false, false, true) => (
            CheckStatus::Fail,
            "database missing but an archive exists; run `coffer recover`".to_string(),
        ),
        (false, true, true) => (CheckStatus::Pass, "migrated; archive retained".to_string()),
        (true, false, _) => (CheckStatus::Pass, "flat file; not migrated".to_string()),
        (false, true, false) => (CheckStatus::Pass, "relational".to_string()),
        (false, false, false) => (CheckStatus::Pass, "empty".to_string()),
    }
}

fn check_master_record(repo: &VaultRepository) -> (CheckStatus, String) {
    let path = repo.paths().master_record();
    if !path.is_file() {
        return (CheckStatus::Warn, "no master-password record".to_string());
    }
    let Ok(key) = repo.session().encryption_key() else {
        return match std::fs::read(&path).map(|b| envelope::peek_metadata(&b)) {
            Ok(Ok(meta)) if meta.content_type == ContentType::MasterPassword => {
                (CheckStatus::Pass, "present".to_string())
            }
            Ok(_) => (CheckStatus::Fail, "record header is malformed".to_string()),
            Err(e) => (CheckStatus::Fail, format!("record unreadable: {e}")),
        };
    };
    match MasterPasswordRecord::load(&path, &key) {
        Ok(Some(record)) => (
            CheckStatus::Pass,
            format!("created {}, {} rotations", record.created_at, record.rotations),
        ),
        Ok(None) => (CheckStatus::Warn, "no master-password record".to_string()),
        Err(e) => (CheckStatus::Fail, format!("record does not open: {e}")),
    }
}

fn check_backups(repo: &VaultRepository, report: &mut IntegrityReport) {
    let started = Instant::now();
    let backups = match repo.backup_store().list() {
        Ok(list) => list,
        Err(e) => {
            report.push("backups", started, (CheckStatus::Fail, format!("listing failed: {e}")));
            return;
        }
    };
    if backups.is_empty() {
        report.push("backups", started, (CheckStatus::Warn, "none retained".to_string()));
        return;
    }
    report.push(
        "backups",
        started,
        (CheckStatus::Pass, format!("{} retained", backups.len())),
    );

    let key = repo.session().encryption_key().ok();
    for info in backups {
        let started = Instant::now();
        let name = format!("backup {}", info.file_name);
        let result = match &key {
            Some(key) => match repo.backup_store().read(&info.path, key) {
                Ok(snapshot) => (
                    CheckStatus::Pass,
                    format!("checksum ok, {} entries", snapshot.entry_count),
                ),
                Err(e) => (CheckStatus::Fail, e.to_string()),
            },
            None => match std::fs::read(&info.path).map(|b| envelope::peek_metadata(&b)) {
                Ok(Ok(meta)) if meta.content_type == ContentType::Backup => {
                    (CheckStatus::Pass, "header intact".to_string())
                }
                Ok(_) => (CheckStatus::Fail, "not a backup envelope".to_string()),
                Err(e) => (CheckStatus::Fail, format!("unreadable: {e}")),
            },
        };
        report.push(&name, started, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupSnapshot;
    use crate::lock::LockManager;
    use crate::paths::VaultPaths;
    use crate::repository::RepositoryOptions;
    use crate::session::SessionHandle;
    use crate::testing::MapSecretStore;
    use coffer_config::model::{LockConfig, StorageBackend};
    use coffer_core::PasswordEntry;
    use std::sync::Arc;
    use zeroize::Zeroizing;

    const KEY: [u8; 32] = [0x42; 32];

    fn setup() -> (VaultRepository, Authenticator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path().join("data"));
        paths.ensure().unwrap();
        let session = SessionHandle::new(Duration::from_secs(60));
        let lock = LockManager::new(paths.lock_file(), &LockConfig::default());
        let repo = VaultRepository::new(
            paths,
            session,
            lock,
            RepositoryOptions {
                new_vault_backend: StorageBackend::File,
                auto_backup: false,
                max_backups: 10,
            },
        );
        (repo, Authenticator::new(Arc::new(MapSecretStore::default())), dir)
    }

    fn status_of(report: &IntegrityReport, name: &str) -> CheckStatus {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_directory_only_warns() {
        let (repo, auth, _dir) = setup();
        let report = check_integrity(&repo, &auth).await;
        assert!(report.ok());
        assert_eq!(status_of(&report, "storage"), CheckStatus::Warn);
        assert_eq!(status_of(&report, "authentication"), CheckStatus::Warn);
    }

    #[tokio::test]
    async fn tampered_backup_fails() {
        let (repo, auth, _dir) = setup();
        repo.session()
            .begin(Zeroizing::new(KEY), "pw".to_string().into());
        repo.create(&PasswordEntry::new("Mail", "a", "x")).await.unwrap();
        let snapshot = BackupSnapshot::new(BackendKind::File, repo.find_all().await.unwrap()).unwrap();
        let info = repo.backup_store().write_snapshot(&snapshot, &KEY).unwrap();

        let report = check_integrity(&repo, &auth).await;
        assert_eq!(status_of(&report, "storage"), CheckStatus::Pass);
        assert!(report.ok());

        let mut bytes = std::fs::read(&info.path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&info.path, bytes).unwrap();

        let report = check_integrity(&repo, &auth).await;
        assert!(!report.ok());
        assert_eq!(
            status_of(&report, &format!("backup {}", info.file_name)),
            CheckStatus::Fail
        );
    }

    #[tokio::test]
    async fn missing_database_with_archive_fails() {
        let (repo, auth, _dir) = setup();
        std::fs::write(repo.paths().archive(), b"archived").unwrap();
        let report = check_integrity(&repo, &auth).await;
        assert_eq!(status_of(&report, "migration state"), CheckStatus::Fail);
    }
}
