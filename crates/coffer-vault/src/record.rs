// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master-password record: setup and rotation history sealed under the key.

use std::path::Path;

use coffer_core::{CofferError, timestamp_now};
use serde::{Deserialize, Serialize};

use crate::crypto::KEY_LEN;
use crate::envelope::{self, ContentType};
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPasswordRecord {
    pub created_at: String,
    pub rotated_at: Option<String>,
    pub rotations: u32,
}

impl MasterPasswordRecord {
    pub fn new() -> Self {
        Self {
            created_at: timestamp_now(),
            rotated_at: None,
            rotations: 0,
        }
    }

    /// The record after one more password change.
    pub fn rotated(&self) -> Self {
        Self {
            created_at: self.created_at.clone(),
            rotated_at: Some(timestamp_now()),
            rotations: self.rotations.saturating_add(1),
        }
    }

    pub fn load(path: &Path, key: &[u8; KEY_LEN]) -> Result<Option<Self>, CofferError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CofferError::io(format!("reading {}", path.display()), e)),
        };
        let plaintext = envelope::decode(&bytes, key)?;
        serde_json::from_slice(&plaintext)
            .map(Some)
            .map_err(|e| CofferError::FileCorrupted(format!("master-password record is malformed: {e}")))
    }

    /// Seal and write. The caller holds the vault lock.
    pub fn save(&self, path: &Path, key: &[u8; KEY_LEN]) -> Result<(), CofferError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CofferError::Internal(format!("serializing record: {e}")))?;
        let sealed = envelope::encode(&json, key, ContentType::MasterPassword)?;
        paths::write_private(path, &sealed)
    }
}

impl Default for MasterPasswordRecord {
    fn default() -> Self {
        Self::new()
    }
}
