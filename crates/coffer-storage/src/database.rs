// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted database lifecycle: keyed open, schema setup, rekey, close, delete.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. The vault keeps exactly one [`Database`] open at a time and closes
//! it explicitly before the files are copied, deleted, or replaced.

use std::path::{Path, PathBuf};

use coffer_core::CofferError;
use tracing::debug;
use zeroize::Zeroizing;

/// Suffixes of the sidecar files SQLite creates next to the main file.
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

/// Map a tokio-rusqlite error into the vault error taxonomy.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CofferError {
    CofferError::Database {
        source: Box::new(e),
    }
}

/// A keyed, migrated handle to the relational store.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the store at `path`, unlock it with `key`, and apply
    /// pending migrations.
    ///
    /// A wrong key or a file that is not an encrypted database fails here with
    /// a `Database` error, before any migration runs.
    pub async fn open(path: &Path, key: &[u8; 32]) -> Result<Self, CofferError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| CofferError::Database {
                source: Box::new(e),
            })?;

        let key_pragma = key_pragma("key", key);
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(&key_pragma)?;
            // Forces a read of page 1; fails with SQLITE_NOTADB on a wrong key.
            conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })?;
            // Rollback journal rather than WAL: rekey requires it.
            conn.execute_batch("PRAGMA journal_mode = DELETE; PRAGMA synchronous = FULL;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        crate::migrations::run_migrations(&conn).await?;

        debug!(path = %path.display(), "encrypted database opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Location of the main database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-encrypt the whole database under `new_key`.
    pub async fn rekey(&self, new_key: &[u8; 32]) -> Result<(), CofferError> {
        let pragma = key_pragma("rekey", new_key);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&pragma)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path.display(), "database rekeyed");
        Ok(())
    }

    /// Close the connection. Every clone of this handle becomes unusable.
    pub async fn close(&self) -> Result<(), CofferError> {
        self.conn
            .clone()
            .close()
            .await
            .map_err(|e| CofferError::database(format!("closing database: {e}")))?;
        debug!(path = %self.path.display(), "database closed");
        Ok(())
    }

    /// Whether a database file exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Remove the database file and its sidecars. Missing files are ignored.
    pub fn delete_files(path: &Path) -> Result<(), CofferError> {
        let mut targets = vec![path.to_path_buf()];
        targets.extend(SIDECAR_SUFFIXES.iter().map(|suffix| sidecar(path, suffix)));
        for target in targets {
            match std::fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "removed database file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CofferError::io(format!("removing {}", target.display()), e)),
            }
        }
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Build `PRAGMA <name> = "x'<hex>'"` for a raw 256-bit key.
fn key_pragma(name: &str, key: &[u8; 32]) -> String {
    let hex_key = Zeroizing::new(hex::encode(key));
    format!("PRAGMA {name} = \"x'{}'\";", hex_key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(&path, &[7u8; 32]).await.unwrap();

        let versions = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT count(*) FROM migrations", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(versions, 1);
        db.close().await.unwrap();
        assert!(Database::exists(&path));
    }

    #[tokio::test]
    async fn reopen_with_wrong_key_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(&path, &[1u8; 32]).await.unwrap();
        db.close().await.unwrap();

        let err = Database::open(&path, &[2u8; 32]).await.unwrap_err();
        assert!(matches!(err, CofferError::Database { .. }));

        let again = Database::open(&path, &[1u8; 32]).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn rekey_switches_the_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(&path, &[3u8; 32]).await.unwrap();
        db.rekey(&[4u8; 32]).await.unwrap();
        db.close().await.unwrap();

        assert!(Database::open(&path, &[3u8; 32]).await.is_err());
        assert!(Database::open(&path, &[4u8; 32]).await.is_ok());
    }

    #[tokio::test]
    async fn delete_files_removes_database_and_sidecars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = Database::open(&path, &[5u8; 32]).await.unwrap();
        db.close().await.unwrap();
        std::fs::write(sidecar(&path, "-journal"), b"x").unwrap();

        Database::delete_files(&path).unwrap();
        assert!(!path.exists());
        assert!(!sidecar(&path, "-journal").exists());
        // Idempotent.
        Database::delete_files(&path).unwrap();
    }

    #[test]
    fn key_pragma_uses_raw_hex_key() {
        let pragma = key_pragma("key", &[0xab; 32]);
        assert!(pragma.starts_with("PRAGMA key = \"x'abab"));
        assert!(pragma.ends_with("'\";"));
    }
}
