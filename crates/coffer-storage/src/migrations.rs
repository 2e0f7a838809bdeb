// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary at build time
//! via `embed_migrations!` and applied every time the store is opened.

use coffer_core::CofferError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against an already keyed connection.
///
/// Refinery tracks applied migrations in its own `refinery_schema_history`
/// table; the `migrations` table created by V1 is the vault's own record.
pub async fn run_migrations(conn: &tokio_rusqlite::Connection) -> Result<(), CofferError> {
    conn.call(|conn| -> Result<(), refinery::Error> {
        embedded::migrations::runner().run(conn)?;
        Ok(())
    })
    .await
    .map_err(|e| CofferError::database(format!("schema migration failed: {e}")))
}
