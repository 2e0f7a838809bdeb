// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-crate test doubles.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use coffer_core::{CofferError, SecretStore};
use secrecy::SecretString;

/// Secret store backed by a map, with switchable read failures.
#[derive(Default)]
pub struct MapSecretStore {
    values: Mutex<BTreeMap<String, String>>,
    fail_reads: AtomicBool,
}

impl MapSecretStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MapSecretStore {
    fn name(&self) -> &str {
        "map"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CofferError::SecretStore("injected read failure".to_string()));
        }
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(account)
            .map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
        self.values
            .lock()
            .unwrap()
            .insert(account.to_string(), secret.to_string());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<bool, CofferError> {
        Ok(self.values.lock().unwrap().remove(account).is_some())
    }
}
