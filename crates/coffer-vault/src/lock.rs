// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cross-process lock guarding every vault mutation.
//!
//! The lock is a marker file created with `create_new`, so at most one
//! process can hold it. A marker older than the stale timeout, dated in the
//! future, or unreadable is treated as abandoned and removed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coffer_config::model::LockConfig;
use coffer_core::CofferError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Contents of the lock marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockMarker {
    created_at_millis: i64,
    pid: u32,
    token: String,
}

/// Acquires and releases the vault lock marker.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    stale_timeout: Duration,
    retry_interval: Duration,
    max_retries: u32,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>, config: &LockConfig) -> Self {
        Self {
            path: path.into(),
            stale_timeout: config.stale_timeout(),
            retry_interval: config.retry_interval(),
            max_retries: config.max_retries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock, making up to `max_retries` attempts.
    ///
    /// Returns `Ok(false)` when the budget runs out while another holder
    /// keeps a fresh marker. I/O failures other than contention are errors.
    pub async fn acquire(&self, max_retries: u32) -> Result<bool, CofferError> {
        let token = hex::encode(crate::crypto::random_array::<8>()?);
        for attempt in 0..max_retries.max(1) {
            self.clear_if_stale();
            if self.try_create(&token)? {
                debug!(attempt, path = %self.path.display(), "lock acquired");
                return Ok(true);
            }
            if attempt + 1 < max_retries {
                tokio::time::sleep(self.retry_interval).await;
            }
        }
        debug!(max_retries, path = %self.path.display(), "lock busy; giving up");
        Ok(false)
    }

    /// Remove the marker. Best effort and idempotent.
    pub fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "failed to release lock"),
        }
    }

    /// Acquire with the configured retry budget, returning a guard that
    /// releases on drop. Fails with `PermissionDenied` when the lock is busy.
    pub async fn guard(&self) -> Result<LockGuard<'_>, CofferError> {
        if self.acquire(self.max_retries).await? {
            Ok(LockGuard { manager: self })
        } else {
            Err(CofferError::PermissionDenied(format!(
                "vault is locked by another process ({})",
                self.path.display()
            )))
        }
    }

    /// Whether a marker currently exists.
    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    fn try_create(&self, token: &str) -> Result<bool, CofferError> {
        let marker = LockMarker {
            created_at_millis: chrono::Utc::now().timestamp_millis(),
            pid: std::process::id(),
            token: token.to_string(),
        };
        let body = serde_json::to_vec(&marker)
            .map_err(|e| CofferError::Internal(format!("serializing lock marker: {e}")))?;

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(CofferError::io(format!("creating {}", self.path.display()), e)),
        };
        if let Err(e) = file.write_all(&body).and_then(|()| file.sync_all()) {
            drop(file);
            self.release();
            return Err(CofferError::io(format!("writing {}", self.path.display()), e));
        }
        drop(file);

        // Confirm the marker on disk is ours before reporting success.
        match read_marker(&self.path) {
            Some(on_disk) if on_disk.token == token => Ok(true),
            _ => Ok(false),
        }
    }

    fn clear_if_stale(&self) {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        let reason = match serde_json::from_slice::<LockMarker>(&bytes) {
            // A marker still being written by its owner is briefly unparseable.
            Err(_) if self.marker_mtime_age() < self.retry_interval => None,
            Err(_) => Some("unreadable".to_string()),
            Ok(marker) => {
                let age = chrono::Utc::now().timestamp_millis() - marker.created_at_millis;
                if age < 0 {
                    Some("dated in the future".to_string())
                } else if age as u128 >= self.stale_timeout.as_millis() {
                    Some(format!("{age} ms old"))
                } else {
                    None
                }
            }
        };
        if let Some(reason) = reason {
            warn!(path = %self.path.display(), %reason, "removing stale lock");
            self.release();
        }
    }

    fn marker_mtime_age(&self) -> Duration {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .unwrap_or(Duration::MAX)
    }
}

fn read_marker(path: &Path) -> Option<LockMarker> {
    std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release();
    }
}
