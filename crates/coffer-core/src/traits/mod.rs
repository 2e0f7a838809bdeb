// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams between the vault engine and its backends.
//!
//! Both traits use `#[async_trait]` for dynamic dispatch compatibility, so
//! strategies can be selected at startup and held as `Arc<dyn ...>`.

pub mod credential_store;
pub mod secret_store;

pub use credential_store::CredentialStore;
pub use secret_store::SecretStore;
