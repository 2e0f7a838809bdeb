// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Coffer secrets vault.
//!
//! This crate provides the error taxonomy, the shared domain types, and the
//! adapter traits that the storage backends and secret stores implement.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{CofferError, ErrorKind};
pub use types::{BackendKind, EntryUpdate, HealthStatus, PasswordEntry, timestamp_now};

pub use traits::{CredentialStore, SecretStore};
