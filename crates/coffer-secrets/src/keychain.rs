// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS keychain secret store via the `keyring` crate.
//!
//! Uses Keychain on macOS, Credential Manager on Windows and the Secret
//! Service on Linux. The calls block, so each runs on the blocking pool.

use async_trait::async_trait;
use coffer_core::{CofferError, SecretStore};
use secrecy::SecretString;
use tracing::debug;

const PROBE_ACCOUNT: &str = "__coffer_probe__";

/// Secret store backed by the platform credential service.
#[derive(Debug, Clone)]
pub struct KeychainSecretStore {
    service: String,
}

impl KeychainSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn with_entry<T, F>(&self, account: &str, f: F) -> Result<T, CofferError>
    where
        T: Send + 'static,
        F: FnOnce(&keyring::Entry) -> keyring::Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let account = account.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account).map_err(keychain_err)?;
            f(&entry).map_err(keychain_err)
        })
        .await
        .map_err(|e| CofferError::Internal(format!("keychain task failed: {e}")))?
    }
}

fn keychain_err(e: keyring::Error) -> CofferError {
    CofferError::SecretStore(format!("keychain: {e}"))
}

#[async_trait]
impl SecretStore for KeychainSecretStore {
    fn name(&self) -> &str {
        "keychain"
    }

    async fn is_available(&self) -> bool {
        let result = self
            .with_entry(PROBE_ACCOUNT, |entry| match entry.get_password() {
                Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e),
            })
            .await;
        if let Err(ref e) = result {
            debug!(error = %e, "keychain probe failed");
        }
        result.is_ok()
    }

    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
        self.with_entry(account, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(SecretString::from(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
        let secret = zeroize::Zeroizing::new(secret.to_string());
        self.with_entry(account, move |entry| entry.set_password(&secret))
            .await
    }

    async fn delete(&self, account: &str) -> Result<bool, CofferError> {
        self.with_entry(account, |entry| match entry.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }
}
