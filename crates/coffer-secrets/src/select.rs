// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret store selection: probe the preferred backend once, fall back to
//! the encrypted file when it is unavailable or starts failing.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use coffer_config::model::{CofferConfig, SecretBackend};
use coffer_core::{CofferError, SecretStore};
use secrecy::SecretString;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::file::FileSecretStore;
use crate::keychain::KeychainSecretStore;

/// A primary store with a fallback, chosen by a cached capability probe.
///
/// Once the primary fails a call, every later call goes to the fallback.
pub struct FallbackSecretStore {
    primary: Arc<dyn SecretStore>,
    fallback: Arc<dyn SecretStore>,
    probed: OnceCell<bool>,
    degraded: AtomicBool,
}

impl std::fmt::Debug for FallbackSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSecretStore")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .field("probed", &self.probed.get())
            .field("degraded", &self.degraded.load(Ordering::SeqCst))
            .finish()
    }
}

impl FallbackSecretStore {
    pub fn new(primary: Arc<dyn SecretStore>, fallback: Arc<dyn SecretStore>) -> Self {
        Self {
            primary,
            fallback,
            probed: OnceCell::new(),
            degraded: AtomicBool::new(false),
        }
    }

    async fn use_primary(&self) -> bool {
        let available = *self
            .probed
            .get_or_init(|| async {
                let ok = self.primary.is_available().await;
                if ok {
                    info!(backend = self.primary.name(), "secret store selected");
                } else {
                    warn!(
                        primary = self.primary.name(),
                        fallback = self.fallback.name(),
                        "secret store unavailable; using fallback"
                    );
                }
                ok
            })
            .await;
        available && !self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, error: &CofferError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                primary = self.primary.name(),
                fallback = self.fallback.name(),
                %error,
                "secret store failed; switching to fallback"
            );
        }
    }

    /// The backend the next call will use.
    pub async fn active_name(&self) -> &str {
        if self.use_primary().await {
            self.primary.name()
        } else {
            self.fallback.name()
        }
    }
}

#[async_trait]
impl SecretStore for FallbackSecretStore {
    fn name(&self) -> &str {
        "auto"
    }

    async fn is_available(&self) -> bool {
        self.use_primary().await || self.fallback.is_available().await
    }

    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
        if self.use_primary().await {
            match self.primary.get(account).await {
                Ok(value) => return Ok(value),
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.get(account).await
    }

    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
        if self.use_primary().await {
            match self.primary.set(account, secret).await {
                Ok(()) => return Ok(()),
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.set(account, secret).await
    }

    async fn delete(&self, account: &str) -> Result<bool, CofferError> {
        if self.use_primary().await {
            match self.primary.delete(account).await {
                Ok(removed) => return Ok(removed),
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.delete(account).await
    }
}

/// Location of the encrypted fallback file for `config`.
pub fn fallback_path(config: &CofferConfig) -> PathBuf {
    match &config.secrets.fallback_file {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(&config.storage.data_dir).join("secrets.enc"),
    }
}

/// Build the secret store named by `[secrets] backend`.
pub fn select_secret_store(config: &CofferConfig) -> Result<Arc<dyn SecretStore>, CofferError> {
    let service = &config.secrets.service_name;
    let store: Arc<dyn SecretStore> = match config.secrets.backend {
        SecretBackend::Keychain => Arc::new(KeychainSecretStore::new(service.clone())),
        SecretBackend::File => Arc::new(FileSecretStore::for_machine(fallback_path(config), service)?),
        SecretBackend::Auto => Arc::new(FallbackSecretStore::new(
            Arc::new(KeychainSecretStore::new(service.clone())),
            Arc::new(FileSecretStore::for_machine(fallback_path(config), service)?),
        )),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySecretStore;
    use secrecy::ExposeSecret;
    use std::sync::atomic::AtomicUsize;

    /// Primary that reports availability as configured and can fail calls.
    struct Flaky {
        available: bool,
        fail: AtomicBool,
        probes: AtomicUsize,
        inner: MemorySecretStore,
    }

    impl Flaky {
        fn new(available: bool) -> Self {
            Self {
                available,
                fail: AtomicBool::new(false),
                probes: AtomicUsize::new(0),
                inner: MemorySecretStore::new(),
            }
        }

        fn check(&self) -> Result<(), CofferError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(CofferError::SecretStore("keychain locked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SecretStore for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
            self.check()?;
            self.inner.get(account).await
        }

        async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
            self.check()?;
            self.inner.set(account, secret).await
        }

        async fn delete(&self, account: &str) -> Result<bool, CofferError> {
            self.check()?;
            self.inner.delete(account).await
        }
    }

    #[tokio::test]
    async fn available_primary_is_probed_once_and_used() {
        let primary = Arc::new(Flaky::new(true));
        let fallback = Arc::new(MemorySecretStore::new());
        let store = FallbackSecretStore::new(primary.clone(), fallback.clone());

        store.set("a", "1").await.unwrap();
        store.get("a").await.unwrap();
        assert_eq!(primary.probes.load(Ordering::SeqCst), 1);
        assert_eq!(store.active_name().await, "flaky");
        assert!(fallback.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_primary_uses_fallback() {
        let primary = Arc::new(Flaky::new(false));
        let fallback = Arc::new(MemorySecretStore::new());
        let store = FallbackSecretStore::new(primary, fallback.clone());

        store.set("a", "1").await.unwrap();
        assert_eq!(fallback.get("a").await.unwrap().unwrap().expose_secret(), "1");
        assert_eq!(store.active_name().await, "memory");
    }

    #[tokio::test]
    async fn primary_error_switches_to_fallback() {
        let primary = Arc::new(Flaky::new(true));
        let fallback = Arc::new(MemorySecretStore::new());
        let store = FallbackSecretStore::new(primary.clone(), fallback.clone());

        primary.fail.store(true, Ordering::SeqCst);
        store.set("a", "1").await.unwrap();
        assert_eq!(store.active_name().await, "memory");

        primary.fail.store(false, Ordering::SeqCst);
        assert_eq!(store.get("a").await.unwrap().unwrap().expose_secret(), "1");
    }

    #[test]
    fn fallback_path_defaults_into_data_dir() {
        let mut config = CofferConfig::default();
        config.storage.data_dir = "/var/lib/coffer".to_string();
        assert_eq!(fallback_path(&config), PathBuf::from("/var/lib/coffer/secrets.enc"));
        config.secrets.fallback_file = Some("/tmp/s.enc".to_string());
        assert_eq!(fallback_path(&config), PathBuf::from("/tmp/s.enc"));
    }
}
