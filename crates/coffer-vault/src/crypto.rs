// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM and HMAC-SHA-256 primitives.
//!
//! Every call to [`seal`] generates a fresh random 96-bit nonce via the system
//! CSPRNG. Nonce reuse would be catastrophic for GCM security.

use coffer_core::CofferError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, Tag, UnboundKey};
use ring::digest;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HMAC_LEN: usize = 32;

/// Output of [`seal`]: detached nonce, tag, and ciphertext.
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, CofferError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CofferError::Internal("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` with AES-256-GCM, authenticating `aad` alongside it.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Sealed, CofferError> {
    let key = aead_key(key)?;
    let nonce_bytes: [u8; NONCE_LEN] = random_array()?;
    let mut in_out = plaintext.to_vec();
    let tag = key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| CofferError::Internal("AES-256-GCM encryption failed".to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());
    Ok(Sealed {
        nonce: nonce_bytes,
        tag: tag_bytes,
        ciphertext: in_out,
    })
}

/// Decrypt and authenticate. Any failure is reported as `DecryptionFailed`.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>, CofferError> {
    let key = aead_key(key)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place_separate_tag(
            Nonce::assume_unique_for_key(*nonce),
            Aad::from(aad),
            Tag::from(*tag),
            &mut in_out,
            0..,
        )
        .map_err(|_| {
            CofferError::DecryptionFailed("wrong key or tampered ciphertext".to_string())
        })?;
    Ok(plaintext.to_vec())
}

/// HMAC-SHA-256 of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; HMAC_LEN] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let mut out = [0u8; HMAC_LEN];
    out.copy_from_slice(hmac::sign(&key, message).as_ref());
    out
}

/// Constant-time check of `expected` against HMAC-SHA-256 of `message`.
pub fn hmac_verify(key: &[u8], message: &[u8], expected: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, message, expected).is_ok()
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

/// Fill a fixed-size array from the system CSPRNG.
pub fn random_array<const N: usize>() -> Result<[u8; N], CofferError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| CofferError::Internal("system random generator failed".to_string()))?;
    Ok(out)
}
