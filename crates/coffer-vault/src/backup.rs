// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted backup snapshots, restore, and disaster recovery.
//!
//! A backup is a [`BackupSnapshot`] serialized to JSON and sealed in an
//! envelope under the current session key. Snapshots are normalized: they
//! hold decoded entries, never a byte copy of another artifact, so every
//! retained backup opens with the current key.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coffer_core::{BackendKind, CofferError, PasswordEntry, timestamp_now};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN};
use crate::envelope::{self, ContentType};
use crate::legacy::{self, UnsealedPasswords};
use crate::repository::VaultRepository;

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".enc";

/// Decrypted contents of a backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub backend: BackendKind,
    pub created_at: String,
    pub entry_count: usize,
    /// Hex SHA-256 of the JSON-serialized entries.
    pub checksum: String,
    pub entries: Vec<PasswordEntry>,
}

impl BackupSnapshot {
    pub fn new(backend: BackendKind, entries: Vec<PasswordEntry>) -> Result<Self, CofferError> {
        Ok(Self {
            backend,
            created_at: timestamp_now(),
            entry_count: entries.len(),
            checksum: checksum(&entries)?,
            entries,
        })
    }

    /// Recompute the checksum and entry count.
    pub fn verify(&self) -> Result<(), CofferError> {
        if self.entry_count != self.entries.len() {
            return Err(CofferError::FileCorrupted(format!(
                "backup declares {} entries but holds {}",
                self.entry_count,
                self.entries.len()
            )));
        }
        if checksum(&self.entries)? != self.checksum {
            return Err(CofferError::FileCorrupted("backup checksum mismatch".to_string()));
        }
        Ok(())
    }
}

fn checksum(entries: &[PasswordEntry]) -> Result<String, CofferError> {
    let json = Zeroizing::new(
        serde_json::to_vec(entries)
            .map_err(|e| CofferError::Internal(format!("serializing backup entries: {e}")))?,
    );
    Ok(hex::encode(crypto::sha256(&json)))
}

/// A retained backup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    /// Creation time from the envelope header; `None` if the header is unreadable.
    pub created_at: Option<String>,
}

/// Backup directory with a retention cap.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups: max_backups.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Seal and write `snapshot` under `key`.
    pub fn write_snapshot(
        &self,
        snapshot: &BackupSnapshot,
        key: &[u8; KEY_LEN],
    ) -> Result<BackupInfo, CofferError> {
        self.write_sealed(&seal_snapshot(snapshot, key)?)
    }

    /// Write an already sealed snapshot, evicting the oldest backups first
    /// so the retained count never exceeds the cap.
    pub fn write_sealed(&self, sealed: &[u8]) -> Result<BackupInfo, CofferError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CofferError::io(format!("creating {}", self.dir.display()), e))?;
        let mut existing = self.list()?;
        while existing.len() >= self.max_backups {
            if let Some(oldest) = existing.pop() {
                remove_backup_file(&oldest.path)?;
                info!(file = %oldest.file_name, "evicted oldest backup");
            }
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
        for seq in 0..10_000u32 {
            let path = self.dir.join(format!("{BACKUP_PREFIX}{stamp}-{seq:04}{BACKUP_SUFFIX}"));
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = match options.open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(CofferError::io(format!("creating {}", path.display()), e)),
            };
            file.write_all(sealed)
                .and_then(|()| file.sync_all())
                .map_err(|e| CofferError::io(format!("writing {}", path.display()), e))?;
            debug!(path = %path.display(), "backup written");
            return Ok(self.info_for(path));
        }
        Err(CofferError::Internal("could not allocate a backup file name".to_string()))
    }

    /// Retained backups, newest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>, CofferError> {
        let dir = match std::fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CofferError::io(format!("listing {}", self.dir.display()), e)),
        };
        let mut paths: Vec<PathBuf> = dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
            })
            .collect();
        paths.sort();
        paths.reverse();
        Ok(paths.into_iter().map(|p| self.info_for(p)).collect())
    }

    /// Decrypt a backup and verify its checksum.
    pub fn read(&self, path: &Path, key: &[u8; KEY_LEN]) -> Result<BackupSnapshot, CofferError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CofferError::io(format!("reading {}", path.display()), e))?;
        open_snapshot(&bytes, key)
    }

    /// Resolve `path` (absolute, or a file name inside the backup directory)
    /// and confirm the real path lies inside the backup directory.
    pub fn resolve_inside(&self, path: &Path) -> Result<PathBuf, CofferError> {
        let candidate = if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        };
        let real = candidate
            .canonicalize()
            .map_err(|e| CofferError::io(format!("resolving {}", candidate.display()), e))?;
        let root = self
            .dir
            .canonicalize()
            .map_err(|e| CofferError::io(format!("resolving {}", self.dir.display()), e))?;
        if real.parent() != Some(root.as_path()) || !real.is_file() {
            return Err(CofferError::PermissionDenied(format!(
                "{} is not a backup file",
                candidate.display()
            )));
        }
        Ok(real)
    }

    fn info_for(&self, path: PathBuf) -> BackupInfo {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let created_at = read_header(&path).map(|meta| meta.created_at);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        BackupInfo {
            path,
            file_name,
            size,
            created_at,
        }
    }
}

fn read_header(path: &Path) -> Option<envelope::EnvelopeMetadata> {
    let bytes = std::fs::read(path).ok()?;
    envelope::peek_metadata(&bytes).ok()
}

fn remove_backup_file(path: &Path) -> Result<(), CofferError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CofferError::io(format!("removing {}", path.display()), e)),
    }
}

/// Serialize and seal a snapshot.
pub fn seal_snapshot(snapshot: &BackupSnapshot, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CofferError> {
    let json = Zeroizing::new(
        serde_json::to_vec(snapshot)
            .map_err(|e| CofferError::Internal(format!("serializing backup: {e}")))?,
    );
    envelope::encode(&json, key, ContentType::Backup)
}

/// Open and verify a sealed snapshot.
pub fn open_snapshot(bytes: &[u8], key: &[u8; KEY_LEN]) -> Result<BackupSnapshot, CofferError> {
    let opened = envelope::open(bytes, key)?;
    if opened.metadata.content_type != ContentType::Backup {
        return Err(CofferError::InvalidEncryptionFormat(format!(
            "expected a backup envelope, found {:?}",
            opened.metadata.content_type
        )));
    }
    let snapshot: BackupSnapshot = serde_json::from_slice(&opened.plaintext)
        .map_err(|e| CofferError::FileCorrupted(format!("backup contents are malformed: {e}")))?;
    snapshot.verify()?;
    Ok(snapshot)
}

/// Where [`BackupManager::recover_database`] found usable data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySource {
    Archive(PathBuf),
    Backup(PathBuf),
}

/// High-level backup operations over the active vault.
#[derive(Debug, Clone)]
pub struct BackupManager {
    repo: Arc<VaultRepository>,
}

impl BackupManager {
    pub fn new(repo: Arc<VaultRepository>) -> Self {
        Self { repo }
    }

    fn store(&self) -> &BackupStore {
        self.repo.backup_store()
    }

    /// Snapshot the active backend under the current key.
    ///
    /// Encryption happens before the lock is taken. With `skip_lock` the
    /// caller must already hold it. The session ends once the file is written.
    pub async fn create_backup(&self, skip_lock: bool) -> Result<BackupInfo, CofferError> {
        let key = self.repo.session().encryption_key()?;
        let entries = self.repo.find_all().await?;
        let snapshot = BackupSnapshot::new(self.repo.backend_kind(), entries)?;
        let sealed = seal_snapshot(&snapshot, &key)?;

        let _guard = if skip_lock {
            None
        } else {
            Some(self.repo.lock_manager().guard().await?)
        };
        let info = self.store().write_sealed(&sealed)?;
        self.repo.session().end();
        info!(file = %info.file_name, entries = snapshot.entry_count, "backup created");
        Ok(info)
    }

    /// Replace the active vault contents with a backup.
    ///
    /// The current contents are backed up first, once. The session ends
    /// afterwards.
    pub async fn restore_backup(&self, path: &Path, skip_lock: bool) -> Result<usize, CofferError> {
        let real = self.store().resolve_inside(path)?;
        let key = self.repo.session().encryption_key()?;
        let snapshot = self.store().read(&real, &key)?;

        let _guard = if skip_lock {
            None
        } else {
            Some(self.repo.lock_manager().guard().await?)
        };
        // An auto-backing-up file store snapshots the old contents itself.
        if self.repo.detect_backend().is_some() && !self.repo.writes_back_up() {
            match self.safety_backup(&key).await {
                Ok(info) => debug!(file = %info.file_name, "pre-restore safety backup written"),
                Err(e) => warn!(error = %e, "pre-restore safety backup failed"),
            }
        }
        self.repo.write_all_unlocked(&snapshot.entries).await?;
        self.repo.session().end();
        info!(file = %real.display(), entries = snapshot.entry_count, "backup restored");
        Ok(snapshot.entry_count)
    }

    async fn safety_backup(&self, key: &[u8; KEY_LEN]) -> Result<BackupInfo, CofferError> {
        let current = self.repo.find_all().await?;
        let snapshot = BackupSnapshot::new(self.repo.backend_kind(), current)?;
        self.store().write_snapshot(&snapshot, key)
    }

    /// Delete one backup file. Paths outside the backup directory are refused.
    pub async fn delete_backup(&self, path: &Path) -> Result<(), CofferError> {
        let real = self.store().resolve_inside(path)?;
        let _guard = self.repo.lock_manager().guard().await?;
        remove_backup_file(&real)?;
        self.repo.session().end();
        info!(file = %real.display(), "backup deleted");
        Ok(())
    }

    /// Retained backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CofferError> {
        self.store().list()
    }

    /// Rebuild the relational store from the archived flat file, or failing
    /// that from the newest backup that opens.
    ///
    /// Any existing database is discarded first. Fails with a `Database`
    /// error when no source yields a usable store.
    pub async fn recover_database(&self) -> Result<RecoverySource, CofferError> {
        let _guard = self.repo.lock_manager().guard().await?;
        self.recover_database_unlocked().await
    }

    /// [`BackupManager::recover_database`] for callers already holding the lock.
    pub(crate) async fn recover_database_unlocked(&self) -> Result<RecoverySource, CofferError> {
        let key = self.repo.session().encryption_key()?;

        let archive = self.repo.paths().archive();
        let mut sources = Vec::new();
        if archive.is_file() {
            sources.push(RecoverySource::Archive(archive));
        }
        sources.extend(
            self.store()
                .list()?
                .into_iter()
                .map(|info| RecoverySource::Backup(info.path)),
        );

        for source in sources {
            let loaded = match &source {
                RecoverySource::Archive(path) => std::fs::read(path)
                    .map_err(|e| CofferError::io(format!("reading {}", path.display()), e))
                    // The archive was accepted by an earlier migration.
                    .and_then(|bytes| {
                        legacy::parse(&bytes, &key, UnsealedPasswords::Seal)
                            .map(|(_, entries)| entries)
                    }),
                RecoverySource::Backup(path) => {
                    self.store().read(path, &key).map(|snapshot| snapshot.entries)
                }
            };
            let entries = match loaded {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(?source, error = %e, "recovery source unusable");
                    continue;
                }
            };
            match self.rebuild(&entries, &key).await {
                Ok(()) => {
                    info!(?source, entries = entries.len(), "database recovered");
                    return Ok(source);
                }
                Err(e) => warn!(?source, error = %e, "rebuild from source failed"),
            }
        }
        Err(CofferError::database(
            "no archive or backup could rebuild the database".to_string(),
        ))
    }

    async fn rebuild(&self, entries: &[PasswordEntry], key: &[u8; KEY_LEN]) -> Result<(), CofferError> {
        self.repo.delete_database().await?;
        let result = self.populate(entries, key).await;
        if result.is_err() {
            self.repo.delete_database().await?;
        }
        result
    }

    async fn populate(&self, entries: &[PasswordEntry], key: &[u8; KEY_LEN]) -> Result<(), CofferError> {
        use coffer_storage::queries::passwords;

        let store = self.repo.open_database(key).await?;
        let skipped = passwords::insert_many(store.database(), entries).await?;
        let stored = passwords::count(store.database()).await?;
        if !skipped.is_empty() || stored != entries.len() {
            return Err(CofferError::DatabaseIntegrityFailed(format!(
                "expected {} rows, stored {stored}",
                entries.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x55; 32];

    fn entries(n: usize) -> Vec<PasswordEntry> {
        (0..n)
            .map(|i| PasswordEntry::new("svc", format!("id{i}"), format!("pw{i}")))
            .collect()
    }

    #[test]
    fn snapshot_round_trips_and_detects_tampering() {
        let snapshot = BackupSnapshot::new(BackendKind::File, entries(3)).unwrap();
        let sealed = seal_snapshot(&snapshot, &KEY).unwrap();
        assert_eq!(open_snapshot(&sealed, &KEY).unwrap(), snapshot);

        let mut forged = snapshot.clone();
        forged.entries[0].identifier = "changed".into();
        let sealed = seal_snapshot(&forged, &KEY).unwrap();
        let err = open_snapshot(&sealed, &KEY).unwrap_err();
        assert!(matches!(err, CofferError::FileCorrupted(_)));
    }

    #[test]
    fn non_backup_envelope_is_rejected() {
        let sealed = envelope::encode(b"[]", &KEY, ContentType::Vault).unwrap();
        let err = open_snapshot(&sealed, &KEY).unwrap_err();
        assert!(matches!(err, CofferError::InvalidEncryptionFormat(_)));
    }

    #[test]
    fn eleventh_backup_evicts_exactly_the_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backups"), 10);
        let mut written = Vec::new();
        for i in 0..10 {
            let info = store
                .write_snapshot(&BackupSnapshot::new(BackendKind::File, entries(i)).unwrap(), &KEY)
                .unwrap();
            written.push(info.path);
        }
        assert_eq!(store.list().unwrap().len(), 10);

        store
            .write_snapshot(&BackupSnapshot::new(BackendKind::File, entries(1)).unwrap(), &KEY)
            .unwrap();
        let listed: Vec<PathBuf> = store.list().unwrap().into_iter().map(|b| b.path).collect();
        assert_eq!(listed.len(), 10);
        assert!(!listed.contains(&written[0]));
        for kept in &written[1..] {
            assert!(listed.contains(kept));
        }
    }

    #[test]
    fn list_is_newest_first_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path(), 10);
        let first = store
            .write_snapshot(&BackupSnapshot::new(BackendKind::File, entries(1)).unwrap(), &KEY)
            .unwrap();
        let second = store
            .write_snapshot(&BackupSnapshot::new(BackendKind::File, entries(2)).unwrap(), &KEY)
            .unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed[0].path, second.path);
        assert_eq!(listed[1].path, first.path);
        assert!(listed[0].created_at.is_some());
        assert!(listed[0].size > 0);
    }

    #[test]
    fn resolve_inside_refuses_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("backups"), 10);
        let info = store
            .write_snapshot(&BackupSnapshot::new(BackendKind::File, entries(1)).unwrap(), &KEY)
            .unwrap();
        assert!(store.resolve_inside(&info.path).is_ok());
        assert!(store.resolve_inside(Path::new(&info.file_name)).is_ok());

        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"x").unwrap();
        let err = store.resolve_inside(&outside).unwrap_err();
        assert!(matches!(err, CofferError::PermissionDenied(_)));
        let err = store
            .resolve_inside(Path::new("../secret.txt"))
            .unwrap_err();
        assert!(matches!(err, CofferError::PermissionDenied(_)));
    }
}
