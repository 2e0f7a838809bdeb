// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password entry CRUD operations.

use coffer_core::{CofferError, EntryUpdate, PasswordEntry, timestamp_now};
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err};

const COLUMNS: &str =
    "service, identifier, encrypted_password, created_at, updated_at, last_accessed";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<PasswordEntry> {
    Ok(PasswordEntry {
        service: row.get(0)?,
        identifier: row.get(1)?,
        encrypted_password: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_accessed: row.get(5)?,
    })
}

fn insert_row(conn: &rusqlite::Connection, entry: &PasswordEntry) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO passwords
             (service, identifier, encrypted_password, created_at, updated_at, last_accessed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(service, identifier) DO NOTHING",
        params![
            entry.service,
            entry.identifier,
            entry.encrypted_password,
            entry.created_at,
            entry.updated_at,
            entry.last_accessed,
        ],
    )
}

/// Insert one entry. Fails with `DuplicateIdentifier` if the pair exists.
pub async fn insert(db: &Database, entry: &PasswordEntry) -> Result<(), CofferError> {
    let row = entry.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> { insert_row(conn, &row) })
        .await
        .map_err(map_tr_err)?;
    if inserted == 0 {
        return Err(CofferError::DuplicateIdentifier {
            service: entry.service.clone(),
            identifier: entry.identifier.clone(),
        });
    }
    Ok(())
}

/// Insert many entries in a single transaction.
///
/// Returns the pairs that were skipped because they already existed; the
/// caller decides whether that is an error.
pub async fn insert_many(
    db: &Database,
    entries: &[PasswordEntry],
) -> Result<Vec<(String, String)>, CofferError> {
    let rows = entries.to_vec();
    db.connection()
        .call(move |conn| -> Result<Vec<(String, String)>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut skipped = Vec::new();
            for entry in &rows {
                if insert_row(&tx, entry)? == 0 {
                    skipped.push((entry.service.clone(), entry.identifier.clone()));
                }
            }
            tx.commit()?;
            Ok(skipped)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every row and insert `entries`, atomically.
pub async fn replace_all(db: &Database, entries: &[PasswordEntry]) -> Result<(), CofferError> {
    let rows = entries.to_vec();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM passwords", [])?;
            for entry in &rows {
                insert_row(&tx, entry)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All entries ordered by service, then identifier.
pub async fn list_all(db: &Database) -> Result<Vec<PasswordEntry>, CofferError> {
    db.connection()
        .call(|conn| -> Result<Vec<PasswordEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM passwords ORDER BY service, identifier"
            ))?;
            let rows = stmt.query_map([], entry_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Entries for one service, using the service index.
pub async fn list_by_service(
    db: &Database,
    service: &str,
) -> Result<Vec<PasswordEntry>, CofferError> {
    let service = service.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<PasswordEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM passwords WHERE service = ?1 ORDER BY identifier"
            ))?;
            let rows = stmt.query_map(params![service], entry_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// The entry addressed by `(service, identifier)`.
pub async fn get(
    db: &Database,
    service: &str,
    identifier: &str,
) -> Result<Option<PasswordEntry>, CofferError> {
    let (service, identifier) = (service.to_string(), identifier.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<PasswordEntry>, rusqlite::Error> {
            let result = conn.query_row(
                &format!("SELECT {COLUMNS} FROM passwords WHERE service = ?1 AND identifier = ?2"),
                params![service, identifier],
                entry_from_row,
            );
            match result {
                Ok(entry) => Ok(Some(entry)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Case-insensitive substring search over service and identifier.
pub async fn search(db: &Database, needle: &str) -> Result<Vec<PasswordEntry>, CofferError> {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    db.connection()
        .call(move |conn| -> Result<Vec<PasswordEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM passwords
                 WHERE lower(service) LIKE ?1 ESCAPE '\\' OR lower(identifier) LIKE ?1 ESCAPE '\\'
                 ORDER BY service, identifier"
            ))?;
            let rows = stmt.query_map(params![pattern], entry_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Number of stored rows.
pub async fn count(db: &Database) -> Result<usize, CofferError> {
    let n = db
        .connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT count(*) FROM passwords", [], |row| row.get(0))
        })
        .await
        .map_err(map_tr_err)?;
    Ok(usize::try_from(n).unwrap_or_default())
}

/// `(service, identifier)` pairs that occur more than once.
///
/// Always empty while the UNIQUE constraint holds; used as a post-write check.
pub async fn duplicate_pairs(db: &Database) -> Result<Vec<(String, String)>, CofferError> {
    db.connection()
        .call(|conn| -> Result<Vec<(String, String)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT service, identifier FROM passwords
                 GROUP BY service, identifier HAVING count(*) > 1",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

enum UpdateOutcome {
    Updated(PasswordEntry),
    Missing,
    Conflict,
}

/// Apply an update (possibly a rename) and return the stored entry.
pub async fn update(db: &Database, update: &EntryUpdate) -> Result<PasswordEntry, CofferError> {
    let change = update.clone();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<UpdateOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current = tx.query_row(
                &format!("SELECT {COLUMNS} FROM passwords WHERE service = ?1 AND identifier = ?2"),
                params![change.service, change.current_identifier()],
                entry_from_row,
            );
            let mut entry = match current {
                Ok(entry) => entry,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(UpdateOutcome::Missing),
                Err(e) => return Err(e),
            };
            if change.is_rename() {
                let taken: i64 = tx.query_row(
                    "SELECT count(*) FROM passwords WHERE service = ?1 AND identifier = ?2",
                    params![change.service, change.identifier],
                    |row| row.get(0),
                )?;
                if taken > 0 {
                    return Ok(UpdateOutcome::Conflict);
                }
            }
            change.apply_to(&mut entry);
            tx.execute(
                "UPDATE passwords
                 SET identifier = ?1, encrypted_password = ?2, updated_at = ?3
                 WHERE service = ?4 AND identifier = ?5",
                params![
                    entry.identifier,
                    entry.encrypted_password,
                    entry.updated_at,
                    change.service,
                    change.current_identifier(),
                ],
            )?;
            tx.commit()?;
            Ok(UpdateOutcome::Updated(entry))
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        UpdateOutcome::Updated(entry) => Ok(entry),
        UpdateOutcome::Missing => Err(CofferError::NotFound(format!(
            "{} / {}",
            update.service,
            update.current_identifier()
        ))),
        UpdateOutcome::Conflict => Err(CofferError::DuplicateIdentifier {
            service: update.service.clone(),
            identifier: update.identifier.clone(),
        }),
    }
}

/// Delete an entry. Returns whether a row was removed.
pub async fn delete(db: &Database, service: &str, identifier: &str) -> Result<bool, CofferError> {
    let (service, identifier) = (service.to_string(), identifier.to_string());
    let removed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM passwords WHERE service = ?1 AND identifier = ?2",
                params![service, identifier],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(removed > 0)
}

/// Stamp `last_accessed` with the current time. Returns whether a row matched.
pub async fn touch(db: &Database, service: &str, identifier: &str) -> Result<bool, CofferError> {
    let (service, identifier) = (service.to_string(), identifier.to_string());
    let now = timestamp_now();
    let touched = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE passwords SET last_accessed = ?1 WHERE service = ?2 AND identifier = ?3",
                params![now, service, identifier],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(touched > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db"), &[9u8; 32])
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn insert_and_get_entry() {
        let (db, _dir) = setup_db().await;
        let entry = PasswordEntry::new("Mail", "a@b.com", "sealed");
        insert(&db, &entry).await.unwrap();

        let fetched = get(&db, "Mail", "a@b.com").await.unwrap().unwrap();
        assert_eq!(fetched, entry);
        assert!(get(&db, "Mail", "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let (db, _dir) = setup_db().await;
        insert(&db, &PasswordEntry::new("Mail", "a@b.com", "one")).await.unwrap();
        let err = insert(&db, &PasswordEntry::new("Mail", "a@b.com", "two"))
            .await
            .unwrap_err();
        assert!(matches!(err, CofferError::DuplicateIdentifier { .. }));
        assert_eq!(count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_many_reports_skipped_pairs() {
        let (db, _dir) = setup_db().await;
        let rows = vec![
            PasswordEntry::new("A", "x", "1"),
            PasswordEntry::new("B", "y", "2"),
            PasswordEntry::new("A", "x", "3"),
        ];
        let skipped = insert_many(&db, &rows).await.unwrap();
        assert_eq!(skipped, vec![("A".to_string(), "x".to_string())]);
        assert_eq!(count(&db).await.unwrap(), 2);
        assert!(duplicate_pairs(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_renames_and_detects_conflicts() {
        let (db, _dir) = setup_db().await;
        insert(&db, &PasswordEntry::new("Mail", "old", "p1")).await.unwrap();
        insert(&db, &PasswordEntry::new("Mail", "taken", "p2")).await.unwrap();

        let renamed = update(&db, &EntryUpdate::rename("Mail", "old", "new"))
            .await
            .unwrap();
        assert_eq!(renamed.identifier, "new");
        assert_eq!(renamed.encrypted_password, "p1");
        assert!(get(&db, "Mail", "old").await.unwrap().is_none());

        let err = update(&db, &EntryUpdate::rename("Mail", "new", "taken"))
            .await
            .unwrap_err();
        assert!(matches!(err, CofferError::DuplicateIdentifier { .. }));

        let err = update(&db, &EntryUpdate::password("Mail", "ghost", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CofferError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_escapes_wildcards() {
        let (db, _dir) = setup_db().await;
        insert(&db, &PasswordEntry::new("GitHub", "dev@corp", "1")).await.unwrap();
        insert(&db, &PasswordEntry::new("Mail", "100%_real", "2")).await.unwrap();

        let hits = search(&db, "github").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = search(&db, "%_").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].service, "Mail");
    }

    #[tokio::test]
    async fn replace_all_swaps_contents() {
        let (db, _dir) = setup_db().await;
        insert(&db, &PasswordEntry::new("Old", "x", "1")).await.unwrap();
        replace_all(&db, &[PasswordEntry::new("New", "y", "2")]).await.unwrap();

        let all = list_all(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].service, "New");
    }

    #[tokio::test]
    async fn delete_and_touch() {
        let (db, _dir) = setup_db().await;
        insert(&db, &PasswordEntry::new("Mail", "a", "1")).await.unwrap();

        assert!(touch(&db, "Mail", "a").await.unwrap());
        assert!(get(&db, "Mail", "a").await.unwrap().unwrap().last_accessed.is_some());

        assert!(delete(&db, "Mail", "a").await.unwrap());
        assert!(!delete(&db, "Mail", "a").await.unwrap());
        assert!(!touch(&db, "Mail", "a").await.unwrap());
    }
}
