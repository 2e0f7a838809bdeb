// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted-file secret store used when no OS keychain is reachable.
//!
//! The file is a single envelope holding a JSON object of account to value.
//! Its key is derived from the machine identifier and the service name, so
//! the file only opens on the machine that wrote it.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use coffer_core::{CofferError, SecretStore};
use coffer_vault::crypto::KEY_LEN;
use coffer_vault::envelope::{self, ContentType};
use coffer_vault::kdf::{self, PBKDF2_ITERATIONS};
use coffer_vault::paths::write_private;
use secrecy::SecretString;
use tracing::debug;
use zeroize::Zeroizing;

const SALT_CONTEXT: &str = "coffer secret store v1";

type Accounts = BTreeMap<String, String>;

/// Secret store persisted as an envelope at a fixed path (mode 0600).
pub struct FileSecretStore {
    path: PathBuf,
    key: Zeroizing<[u8; KEY_LEN]>,
    // Serializes read-modify-write cycles within this process.
    io: Mutex<()>,
}

impl std::fmt::Debug for FileSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecretStore")
            .field("path", &self.path)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl FileSecretStore {
    /// Open the store at `path`, keyed to this machine and `service`.
    pub fn for_machine(path: impl Into<PathBuf>, service: &str) -> Result<Self, CofferError> {
        let machine_id = machine_uid::get().map_err(|e| {
            CofferError::SecretStore(format!("machine identifier unavailable: {e}"))
        })?;
        let key = derive_machine_key(&machine_id, service);
        Ok(Self::with_key(path, key))
    }

    /// Open the store at `path` under an explicit key.
    pub fn with_key(path: impl Into<PathBuf>, key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self {
            path: path.into(),
            key,
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Accounts, CofferError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Accounts::new());
            }
            Err(e) => return Err(CofferError::io(format!("reading {}", self.path.display()), e)),
        };
        let plaintext = envelope::decode(&bytes, &self.key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CofferError::FileCorrupted(format!("secret store is malformed: {e}")))
    }

    fn write(&self, accounts: &Accounts) -> Result<(), CofferError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CofferError::io(format!("creating {}", parent.display()), e))?;
        }
        let json = Zeroizing::new(
            serde_json::to_vec(accounts)
                .map_err(|e| CofferError::Internal(format!("serializing secret store: {e}")))?,
        );
        let sealed = envelope::encode(&json, &self.key, ContentType::SecretStore)?;
        write_private(&self.path, &sealed)?;
        debug!(path = %self.path.display(), accounts = accounts.len(), "secret store written");
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// PBKDF2 over the machine identifier, salted by the service name.
pub fn derive_machine_key(machine_id: &str, service: &str) -> Zeroizing<[u8; KEY_LEN]> {
    let salt = format!("{SALT_CONTEXT}:{service}");
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    kdf::pbkdf2_sha256(machine_id.as_bytes(), salt.as_bytes(), iterations)
}

#[async_trait]
impl SecretStore for FileSecretStore {
    fn name(&self) -> &str {
        "encrypted-file"
    }

    async fn is_available(&self) -> bool {
        let _io = self.guard();
        self.read().is_ok()
    }

    async fn get(&self, account: &str) -> Result<Option<SecretString>, CofferError> {
        let _io = self.guard();
        Ok(self
            .read()?
            .get(account)
            .map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, account: &str, secret: &str) -> Result<(), CofferError> {
        let _io = self.guard();
        let mut accounts = self.read()?;
        accounts.insert(account.to_string(), secret.to_string());
        self.write(&accounts)
    }

    async fn delete(&self, account: &str) -> Result<bool, CofferError> {
        let _io = self.guard();
        let mut accounts = self.read()?;
        let removed = accounts.remove(account).is_some();
        if removed {
            self.write(&accounts)?;
        }
        Ok(removed)
    }
}
