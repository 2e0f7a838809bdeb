// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Isolated vault fixture.

use std::path::Path;
use std::sync::Arc;

use coffer_config::model::{CofferConfig, StorageBackend};
use coffer_core::CofferError;
use coffer_secrets::MemorySecretStore;
use coffer_vault::Vault;
use secrecy::SecretString;

/// Master password used by [`TestVaultBuilder::build_unlocked`].
pub const TEST_PASSWORD: &str = "Abc12345!";

/// Builder for [`TestVault`].
pub struct TestVaultBuilder {
    backend: StorageBackend,
    auto_backup: bool,
    max_backups: usize,
}

impl TestVaultBuilder {
    fn new() -> Self {
        Self {
            backend: StorageBackend::Relational,
            auto_backup: false,
            max_backups: 10,
        }
    }

    /// Backend used for the fresh vault.
    pub fn with_backend(mut self, backend: StorageBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_auto_backup(mut self, enabled: bool) -> Self {
        self.auto_backup = enabled;
        self
    }

    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.max_backups = max;
        self
    }

    /// Open the vault without setting it up.
    pub fn build(self) -> Result<TestVault, CofferError> {
        let dir = tempfile::TempDir::new()
            .map_err(|e| CofferError::io("creating test directory", e))?;
        let mut config = CofferConfig::default();
        config.storage.data_dir = dir.path().join("data").display().to_string();
        config.storage.new_vault_backend = self.backend;
        config.backup.auto_backup = self.auto_backup;
        config.backup.max_backups = self.max_backups;
        config.lock.retry_interval_ms = 5;
        config.lock.max_retries = 20;

        let secrets = Arc::new(MemorySecretStore::new());
        let vault = Vault::open(&config, secrets.clone())?;
        Ok(TestVault {
            vault,
            secrets,
            config,
            _dir: dir,
        })
    }

    /// Open, set up with [`TEST_PASSWORD`], and leave unlocked.
    pub async fn build_unlocked(self) -> Result<TestVault, CofferError> {
        let harness = self.build()?;
        harness.vault.setup(&TestVault::password()).await?;
        Ok(harness)
    }
}

/// A vault rooted in a temporary directory that is removed on drop.
pub struct TestVault {
    pub vault: Vault,
    pub secrets: Arc<MemorySecretStore>,
    pub config: CofferConfig,
    _dir: tempfile::TempDir,
}

impl TestVault {
    pub fn builder() -> TestVaultBuilder {
        TestVaultBuilder::new()
    }

    /// [`TEST_PASSWORD`] as a secret.
    pub fn password() -> SecretString {
        SecretString::from(TEST_PASSWORD.to_string())
    }

    pub fn data_dir(&self) -> &Path {
        self.vault.repository().paths().root()
    }

    /// A second vault handle over the same directory and secret store, as a
    /// concurrent process would see it.
    pub fn reopen(&self) -> Result<Vault, CofferError> {
        Vault::open(&self.config, self.secrets.clone())
    }
}
