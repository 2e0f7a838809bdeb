// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PBKDF2-HMAC-SHA-256 key derivation and the authentication hash.
//!
//! The authentication key is derived from the master password concatenated
//! with the application secret; the salt is the first 16 bytes of
//! SHA-256(application secret). The same key doubles as the vault's
//! symmetric encryption key and is never persisted.

use std::num::NonZeroU32;

use ring::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN};

/// Fixed PBKDF2 iteration count. Not configurable.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length taken from the application secret digest.
pub const SALT_LEN: usize = 16;

/// Identifier recorded in envelope metadata.
pub const KDF_NAME: &str = "PBKDF2-HMAC-SHA256";

/// Length of the application secret in bytes (512 bits).
pub const APP_SECRET_LEN: usize = 64;

/// Run PBKDF2-HMAC-SHA-256 with an explicit salt and iteration count.
pub fn pbkdf2_sha256(
    material: &[u8],
    salt: &[u8],
    iterations: NonZeroU32,
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        material,
        out.as_mut(),
    );
    out
}

/// Salt derived from the application secret.
pub fn salt_for(app_secret: &[u8]) -> [u8; SALT_LEN] {
    let digest = crypto::sha256(app_secret);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

/// Derive the 256-bit authentication key from password and application secret.
pub fn derive_authentication_key(
    password: &SecretString,
    app_secret: &[u8],
) -> Zeroizing<[u8; KEY_LEN]> {
    let password = password.expose_secret().as_bytes();
    let mut material = Zeroizing::new(Vec::with_capacity(password.len() + app_secret.len()));
    material.extend_from_slice(password);
    material.extend_from_slice(app_secret);
    pbkdf2_sha256(&material, &salt_for(app_secret), iterations())
}

/// HMAC-SHA-256(application secret, authentication key).
pub fn authentication_hash(app_secret: &[u8], key: &[u8; KEY_LEN]) -> [u8; 32] {
    crypto::hmac_sha256(app_secret, key)
}

/// Constant-time comparison of a candidate key against a stored hash.
pub fn verify_authentication_hash(app_secret: &[u8], key: &[u8; KEY_LEN], stored: &[u8]) -> bool {
    crypto::hmac_verify(app_secret, key, stored)
}

fn iterations() -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(PBKDF2_ITERATIONS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn iteration_count_is_fixed() {
        assert_eq!(iterations().get(), 100_000);
    }

    #[test]
    fn derivation_is_deterministic() {
        let app = [7u8; APP_SECRET_LEN];
        let a = derive_authentication_key(&secret("Abc12345!"), &app);
        let b = derive_authentication_key(&secret("Abc12345!"), &app);
        assert_eq!(*a, *b);
    }

    #[test]
    fn changing_either_input_changes_key() {
        let app = [7u8; APP_SECRET_LEN];
        let mut other_app = app;
        other_app[0] ^= 1;
        let base = derive_authentication_key(&secret("Abc12345!"), &app);
        let other_pw = derive_authentication_key(&secret("Abc12345?"), &app);
        let other_secret = derive_authentication_key(&secret("Abc12345!"), &other_app);
        assert_ne!(*base, *other_pw);
        assert_ne!(*base, *other_secret);
    }

    #[test]
    fn salt_is_digest_prefix() {
        let app = [1u8; APP_SECRET_LEN];
        assert_eq!(salt_for(&app)[..], crypto::sha256(&app)[..SALT_LEN]);
    }

    #[test]
    fn authentication_hash_verifies() {
        let app = [3u8; APP_SECRET_LEN];
        let key = derive_authentication_key(&secret("pw"), &app);
        let hash = authentication_hash(&app, &key);
        assert!(verify_authentication_hash(&app, &key, &hash));

        let wrong = derive_authentication_key(&secret("wrong"), &app);
        assert!(!verify_authentication_hash(&app, &wrong, &hash));
    }
}
