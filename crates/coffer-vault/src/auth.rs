// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master-password setup and verification against the secret store.
//!
//! The application secret and the authentication hash live only in the
//! [`SecretStore`]. First-time setup is detected by the absence of either.

use std::sync::Arc;

use coffer_core::{CofferError, SecretStore};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN};
use crate::kdf::{self, APP_SECRET_LEN};

/// Secret-store account holding the hex application secret.
pub const APP_SECRET_ACCOUNT: &str = "app-secret-key";
/// Secret-store account holding the hex authentication hash.
pub const AUTH_HASH_ACCOUNT: &str = "auth-hash";

/// Result of first-time setup.
pub struct SetupOutcome {
    /// The derived authentication/encryption key.
    pub key: Zeroizing<[u8; KEY_LEN]>,
    /// Hex application secret, shown once so the user can store it offline.
    pub recovery_key: SecretString,
}

impl std::fmt::Debug for SetupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOutcome")
            .field("key", &"[REDACTED]")
            .field("recovery_key", &"[REDACTED]")
            .finish()
    }
}

/// Derives keys and checks them against the stored authentication hash.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("store", &self.store.name())
            .finish()
    }
}

impl Authenticator {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// The backing secret store.
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// True iff both the application secret and the hash are present.
    pub async fn is_initialized(&self) -> Result<bool, CofferError> {
        let secret = self.store.get(APP_SECRET_ACCOUNT).await?;
        let hash = self.store.get(AUTH_HASH_ACCOUNT).await?;
        Ok(secret.is_some() && hash.is_some())
    }

    /// First-time setup: create the application secret if absent, derive the
    /// key, and store its hash.
    pub async fn setup_master_password(
        &self,
        password: &SecretString,
    ) -> Result<SetupOutcome, CofferError> {
        let app_secret = match self.load_app_secret().await? {
            Some(existing) => existing,
            None => {
                let fresh = Zeroizing::new(crypto::random_array::<APP_SECRET_LEN>().map_err(
                    |e| CofferError::AppSecretKeyGenerationFailed(e.to_string()),
                )?);
                let encoded = Zeroizing::new(hex::encode(fresh.as_slice()));
                self.store
                    .set(APP_SECRET_ACCOUNT, &encoded)
                    .await
                    .map_err(|e| CofferError::AppSecretKeyGenerationFailed(e.to_string()))?;
                info!(store = self.store.name(), "application secret generated");
                Zeroizing::new(fresh.to_vec())
            }
        };

        let key = self.store_hash_for(password, &app_secret).await?;
        info!("master password configured");
        Ok(SetupOutcome {
            key,
            recovery_key: SecretString::from(hex::encode(app_secret.as_slice())),
        })
    }

    /// Check `password` against the stored hash in constant time.
    ///
    /// Fails closed: any secret-store error or missing material yields `false`.
    pub async fn verify(&self, password: &SecretString) -> bool {
        match self.try_unlock(password).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "verification failed closed");
                false
            }
        }
    }

    /// Verify and, on success, return the derived key.
    pub async fn try_unlock(
        &self,
        password: &SecretString,
    ) -> Result<Option<Zeroizing<[u8; KEY_LEN]>>, CofferError> {
        let app_secret = self.load_app_secret().await?.ok_or_else(|| {
            CofferError::AuthenticationFailed("vault has not been set up".to_string())
        })?;
        let stored = self.load_hash().await?.ok_or_else(|| {
            CofferError::AuthenticationFailed("authentication hash missing".to_string())
        })?;

        let key = kdf::derive_authentication_key(password, &app_secret);
        if kdf::verify_authentication_hash(&app_secret, &key, &stored) {
            debug!("master password verified");
            Ok(Some(key))
        } else {
            debug!("master password rejected");
            Ok(None)
        }
    }

    /// Recompute and overwrite the stored hash for a new password.
    ///
    /// Data encrypted under the previous key is not touched.
    pub async fn update_hash(
        &self,
        new_password: &SecretString,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, CofferError> {
        let app_secret = self.load_app_secret().await?.ok_or_else(|| {
            CofferError::AuthenticationFailed("vault has not been set up".to_string())
        })?;
        let key = self.store_hash_for(new_password, &app_secret).await?;
        info!("authentication hash updated");
        Ok(key)
    }

    /// Re-import an application secret from its hex recovery key.
    pub async fn restore_recovery_key(&self, recovery_key: &SecretString) -> Result<(), CofferError> {
        let decoded = Zeroizing::new(
            hex::decode(recovery_key.expose_secret().trim()).map_err(|_| {
                CofferError::AppSecretKeyGenerationFailed("recovery key is not hex".to_string())
            })?,
        );
        if decoded.len() != APP_SECRET_LEN {
            return Err(CofferError::AppSecretKeyGenerationFailed(format!(
                "recovery key must be {APP_SECRET_LEN} bytes, got {}",
                decoded.len()
            )));
        }
        let encoded = Zeroizing::new(hex::encode(decoded.as_slice()));
        self.store.set(APP_SECRET_ACCOUNT, &encoded).await?;
        info!("application secret restored from recovery key");
        Ok(())
    }

    /// Delete the application secret and the hash. The vault becomes
    /// unreadable until a recovery key is restored.
    pub async fn wipe_credentials(&self) -> Result<(), CofferError> {
        let secret = self.store.delete(APP_SECRET_ACCOUNT).await?;
        let hash = self.store.delete(AUTH_HASH_ACCOUNT).await?;
        warn!(secret, hash, "authentication material wiped");
        Ok(())
    }

    async fn store_hash_for(
        &self,
        password: &SecretString,
        app_secret: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, CofferError> {
        let key = kdf::derive_authentication_key(password, app_secret);
        let hash = kdf::authentication_hash(app_secret, &key);
        self.store.set(AUTH_HASH_ACCOUNT, &hex::encode(hash)).await?;
        Ok(key)
    }

    async fn load_app_secret(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CofferError> {
        let Some(stored) = self.store.get(APP_SECRET_ACCOUNT).await? else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(hex::decode(stored.expose_secret().trim()).map_err(|_| {
            CofferError::AppSecretKeyGenerationFailed("stored application secret is not hex".into())
        })?);
        if bytes.len() != APP_SECRET_LEN {
            return Err(CofferError::AppSecretKeyGenerationFailed(format!(
                "stored application secret has {} bytes, expected {APP_SECRET_LEN}",
                bytes.len()
            )));
        }
        Ok(Some(bytes))
    }

    async fn load_hash(&self) -> Result<Option<Vec<u8>>, CofferError> {
        let Some(stored) = self.store.get(AUTH_HASH_ACCOUNT).await? else {
            return Ok(None);
        };
        hex::decode(stored.expose_secret().trim())
            .map(Some)
            .map_err(|_| CofferError::AuthenticationFailed("stored hash is not hex".to_string()))
    }
}

/// Bounds consecutive failed unlock attempts in one process.
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    remaining: u32,
}

impl AttemptBudget {
    /// Default number of attempts before the caller must give up.
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    pub fn new(attempts: u32) -> Self {
        Self { remaining: attempts }
    }

    /// Record a failure. Returns `false` once the budget is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl Default for AttemptBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS)
    }
}
