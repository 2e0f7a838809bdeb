// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret store strategies for the Coffer vault.
//!
//! The application secret and authentication hash live here, never in the
//! vault files. [`select_secret_store`] picks the strategy from configuration.

pub mod file;
pub mod keychain;
pub mod memory;
pub mod select;

pub use file::FileSecretStore;
pub use keychain::KeychainSecretStore;
pub use memory::MemorySecretStore;
pub use select::{FallbackSecretStore, fallback_path, select_secret_store};
