// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vault authenticates against each secret store strategy.

use std::sync::Arc;

use coffer_config::model::{CofferConfig, SecretBackend};
use coffer_core::SecretStore;
use coffer_secrets::file::derive_machine_key;
use coffer_secrets::{FallbackSecretStore, FileSecretStore, MemorySecretStore};
use coffer_vault::Vault;
use coffer_vault::auth::{APP_SECRET_ACCOUNT, AUTH_HASH_ACCOUNT};
use secrecy::{ExposeSecret, SecretString};

fn config(dir: &std::path::Path) -> CofferConfig {
    let mut config = CofferConfig::default();
    config.storage.data_dir = dir.join("data").display().to_string();
    config.secrets.backend = SecretBackend::File;
    config
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

#[tokio::test]
async fn vault_survives_reopen_with_file_secret_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let path = coffer_secrets::fallback_path(&config);
    let store = || -> Arc<dyn SecretStore> {
        Arc::new(FileSecretStore::with_key(&path, derive_machine_key("test-machine", "coffer")))
    };

    let vault = Vault::open(&config, store()).unwrap();
    vault.setup(&secret("Abc12345!")).await.unwrap();
    vault.add_entry("Mail", "a@b.com", &secret("pw")).await.unwrap();
    drop(vault);

    let reopened = Vault::open(&config, store()).unwrap();
    assert!(reopened.is_initialized().await.unwrap());
    reopened.unlock(&secret("Abc12345!")).await.unwrap();
    assert_eq!(
        reopened.get_password("Mail", "a@b.com").await.unwrap().expose_secret(),
        "pw"
    );
}

#[tokio::test]
async fn auth_material_lands_in_the_fallback_when_primary_is_unusable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let fallback = Arc::new(MemorySecretStore::new());
    let primary = Arc::new(FileSecretStore::with_key(
        dir.path().join("primary/secrets.enc"),
        derive_machine_key("a", "coffer"),
    ));
    // Unreadable under its own key, so the probe fails.
    std::fs::create_dir_all(dir.path().join("primary")).unwrap();
    std::fs::write(primary.path(), b"garbage").unwrap();

    let store = Arc::new(FallbackSecretStore::new(primary, fallback.clone()));
    let vault = Vault::open(&config, store).unwrap();
    vault.setup(&secret("pw")).await.unwrap();

    assert!(fallback.get(APP_SECRET_ACCOUNT).await.unwrap().is_some());
    assert!(fallback.get(AUTH_HASH_ACCOUNT).await.unwrap().is_some());
}
