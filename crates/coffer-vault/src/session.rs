// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local authenticated session holding the cached encryption key.
//!
//! The key lives only inside [`Session`] and is zeroed on expiry, on logout,
//! and when the session is dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use coffer_core::CofferError;
use secrecy::SecretString;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::KEY_LEN;

/// Cached key material for one authenticated window.
pub struct Session {
    authenticated_at: Instant,
    timeout: Duration,
    master_password: Option<SecretString>,
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated_at", &self.authenticated_at)
            .field("timeout", &self.timeout)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Session {
    fn empty(timeout: Duration) -> Self {
        Self {
            authenticated_at: Instant::now(),
            timeout,
            master_password: None,
            key: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.authenticated_at.elapsed() >= self.timeout
    }

    fn scrub(&mut self) {
        self.key = None;
        self.master_password = None;
    }
}

/// Shared handle to the session, passed to every component that needs the key.
#[derive(Clone, Debug)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    /// A session with no key, expiring `timeout` after each authentication.
    pub fn new(timeout: Duration) -> Self {
        Self(Arc::new(Mutex::new(Session::empty(timeout))))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // A poisoned session only ever holds key material; keep using it.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new window with freshly derived key material.
    pub fn begin(&self, key: Zeroizing<[u8; KEY_LEN]>, master_password: SecretString) {
        let mut session = self.lock();
        session.authenticated_at = Instant::now();
        session.key = Some(key);
        session.master_password = Some(master_password);
        debug!(timeout_ms = session.timeout.as_millis() as u64, "session started");
    }

    /// A copy of the cached key, or `AuthenticationFailed` if there is none
    /// or the window has elapsed. An expired key is scrubbed on the way out.
    pub fn encryption_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, CofferError> {
        let mut session = self.lock();
        if session.key.is_some() && session.is_expired() {
            session.scrub();
            debug!("session expired; key material scrubbed");
        }
        session
            .key
            .as_ref()
            .map(|k| Zeroizing::new(**k))
            .ok_or_else(|| {
                CofferError::AuthenticationFailed("no active session; unlock the vault".to_string())
            })
    }

    /// The master password used to open this session, if still valid.
    pub fn master_password(&self) -> Result<SecretString, CofferError> {
        self.encryption_key()?;
        self.lock()
            .master_password
            .clone()
            .ok_or_else(|| CofferError::AuthenticationFailed("no active session".to_string()))
    }

    /// Whether a key is cached and the window is still open.
    pub fn is_active(&self) -> bool {
        self.encryption_key().is_ok()
    }

    /// Scrub the cached key immediately.
    pub fn end(&self) {
        let mut session = self.lock();
        if session.key.is_some() {
            debug!("session ended");
        }
        session.scrub();
    }

    /// The configured inactivity window.
    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Zeroizing<[u8; 32]> {
        Zeroizing::new([5u8; 32])
    }

    #[test]
    fn no_key_before_begin() {
        let session = SessionHandle::new(Duration::from_secs(60));
        let err = session.encryption_key().unwrap_err();
        assert!(matches!(err, CofferError::AuthenticationFailed(_)));
        assert!(!session.is_active());
    }

    #[test]
    fn key_available_within_window_and_gone_after_end() {
        let session = SessionHandle::new(Duration::from_secs(60));
        session.begin(key(), SecretString::from("pw".to_string()));
        assert_eq!(*session.encryption_key().unwrap(), [5u8; 32]);
        assert!(session.master_password().is_ok());

        session.end();
        assert!(session.encryption_key().is_err());
        assert!(session.master_password().is_err());
    }

    #[test]
    fn expired_session_is_scrubbed() {
        let session = SessionHandle::new(Duration::from_millis(0));
        session.begin(key(), SecretString::from("pw".to_string()));
        assert!(session.encryption_key().is_err());
        assert!(session.0.lock().unwrap().key.is_none());
    }

    #[test]
    fn debug_output_redacts_key() {
        let session = SessionHandle::new(Duration::from_secs(1));
        session.begin(key(), SecretString::from("pw".to_string()));
        let printed = format!("{session:?}");
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains("5, 5"));
    }
}
