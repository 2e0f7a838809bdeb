// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout of a vault data directory.

use std::path::{Path, PathBuf};

use coffer_core::CofferError;

/// Every artifact location under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    root: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active flat-file vault.
    pub fn vault_file(&self) -> PathBuf {
        self.root.join("vault.dat")
    }

    /// Most recent pre-write copy of the flat-file vault.
    pub fn vault_bak(&self) -> PathBuf {
        self.root.join("vault.dat.bak")
    }

    /// Archived flat file kept after a successful migration.
    pub fn archive(&self) -> PathBuf {
        self.root.join("vault.dat.migrated")
    }

    /// Temporary file used for atomic replacement of the vault file.
    pub fn vault_tmp(&self) -> PathBuf {
        self.root.join("vault.dat.tmp")
    }

    /// Encrypted relational store.
    pub fn database(&self) -> PathBuf {
        self.root.join("vault.db")
    }

    /// Lock marker.
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("vault.lock")
    }

    /// Directory holding timestamped backup envelopes.
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Master-password record.
    pub fn master_record(&self) -> PathBuf {
        self.root.join("master.rec")
    }

    /// Default location of the encrypted secret-store fallback.
    pub fn secrets_file(&self) -> PathBuf {
        self.root.join("secrets.enc")
    }

    /// Create the data directory (and backup directory) if missing.
    pub fn ensure(&self) -> Result<(), CofferError> {
        std::fs::create_dir_all(self.backup_dir()).map_err(|e| {
            CofferError::io(format!("creating {}", self.backup_dir().display()), e)
        })?;
        restrict_dir(&self.root)?;
        restrict_dir(&self.backup_dir())
    }
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> Result<(), CofferError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| CofferError::io(format!("restricting {}", path.display()), e))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> Result<(), CofferError> {
    Ok(())
}

/// Write `bytes` to `path` readable only by the owner.
pub fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CofferError> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|e| CofferError::io(format!("opening {}", path.display()), e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| CofferError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_data_dir() {
        let paths = VaultPaths::new("/data");
        assert_eq!(paths.vault_file(), PathBuf::from("/data/vault.dat"));
        assert_eq!(paths.archive(), PathBuf::from("/data/vault.dat.migrated"));
        assert_eq!(paths.database(), PathBuf::from("/data/vault.db"));
        assert_eq!(paths.backup_dir(), PathBuf::from("/data/backups"));
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path().join("vault"));
        paths.ensure().unwrap();
        let file = paths.master_record();
        write_private(&file, b"x").unwrap();
        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
