// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local secret store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coffer_core::{CofferError, SecretStore};
use secrecy::SecretString;

/// Secrets held in a map for the lifetime of the value.
#[derive(Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, SecretString>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, SecretString>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("accounts", &self.values().len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
        Ok(self.values().get(account).cloned())
    }

    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
        self.values()
            .insert(account.to_string(), SecretString::from(secret.to_string()));
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<bool, CofferError> {
        Ok(self.values().remove(account).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemorySecretStore::new();
        assert!(store.get("a").await.unwrap().is_none());
        store.set("a", "one").await.unwrap();
        store.set("a", "two").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().expose_secret(), "two");
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }
}
