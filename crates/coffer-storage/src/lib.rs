// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLCipher-encrypted relational backend for the Coffer secrets vault.
//!
//! Provides a keyed database handle with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed CRUD over the `passwords`
//! table, and a [`CredentialStore`](coffer_core::CredentialStore)
//! implementation on top of them.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteCredentialStore;
pub use database::{Database, map_tr_err};
