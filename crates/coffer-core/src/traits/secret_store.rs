// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret store trait for platform credential storage.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CofferError;

/// Opaque key/value persistence for the application secret and the
/// authentication hash.
///
/// Implementations are capability-probed once at startup. Values never
/// reach the vault files.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Returns true if the backend can currently be used.
    async fn is_available(&self) -> bool;

    /// Read a secret. `Ok(None)` means the account has never been written.
    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError>;

    /// Create or overwrite a secret.
    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError>;

    /// Remove a secret. Returns whether anything was deleted.
    async fn delete(&self, account: &str) -> Result<bool, CofferError>;
}
