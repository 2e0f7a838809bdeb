// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned authenticated-encryption container for every persisted artifact.
//!
//! Layout (integers big-endian):
//!
//! ```text
//! VERSION(1) | NONCE(12) | TAG(16) | HMAC(32) | META_LEN(4) | META(JSON) | CIPHERTEXT
//! ```
//!
//! The metadata JSON is bound to the ciphertext as AEAD associated data. The
//! HMAC covers the plaintext under a subkey derived from the encryption key,
//! so an AEAD failure (wrong key) and an HMAC failure (bit-rot after a
//! successful decrypt) surface as different errors.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use coffer_core::{CofferError, timestamp_now};
use ring::{hkdf, hmac};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{self, HMAC_LEN, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::kdf::{KDF_NAME, PBKDF2_ITERATIONS};

/// The only envelope version this crate writes or reads.
pub const VERSION: u8 = 1;

const NONCE_AT: usize = 1;
const TAG_AT: usize = NONCE_AT + NONCE_LEN;
const HMAC_AT: usize = TAG_AT + TAG_LEN;
const META_LEN_AT: usize = HMAC_AT + HMAC_LEN;

/// Fixed header size before the metadata.
pub const HEADER_LEN: usize = META_LEN_AT + 4;

/// Upper bound on the metadata block accepted by the sniffer and decoder.
const MAX_METADATA_LEN: usize = 4096;

const INTEGRITY_INFO: &[u8] = b"coffer envelope integrity v1";

/// What an envelope holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Vault,
    Password,
    Backup,
    MasterPassword,
    SecretStore,
}

/// Plaintext header stored alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub format_version: u8,
    pub kdf: String,
    pub iterations: u32,
    pub created_at: String,
    pub content_type: ContentType,
}

impl EnvelopeMetadata {
    fn new(content_type: ContentType) -> Self {
        Self {
            format_version: VERSION,
            kdf: KDF_NAME.to_string(),
            iterations: PBKDF2_ITERATIONS,
            created_at: timestamp_now(),
            content_type,
        }
    }
}

/// A decoded envelope.
pub struct Opened {
    pub metadata: EnvelopeMetadata,
    pub plaintext: Zeroizing<Vec<u8>>,
}

fn integrity_key(key: &[u8; KEY_LEN]) -> Result<hmac::Key, CofferError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]).extract(key);
    let okm = prk
        .expand(&[INTEGRITY_INFO], hmac::HMAC_SHA256)
        .map_err(|_| CofferError::Internal("integrity subkey derivation failed".to_string()))?;
    Ok(hmac::Key::from(okm))
}

/// Encrypt `plaintext` under `key` into a fresh envelope.
pub fn encode(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    content_type: ContentType,
) -> Result<Vec<u8>, CofferError> {
    let metadata = serde_json::to_vec(&EnvelopeMetadata::new(content_type))
        .map_err(|e| CofferError::Internal(format!("serializing envelope metadata: {e}")))?;
    let meta_len = u32::try_from(metadata.len())
        .map_err(|_| CofferError::Internal("envelope metadata too large".to_string()))?;

    let sealed = crypto::seal(key, &metadata, plaintext)?;
    let mac = hmac::sign(&integrity_key(key)?, plaintext);

    let mut out = Vec::with_capacity(HEADER_LEN + metadata.len() + sealed.ciphertext.len());
    out.push(VERSION);
    out.extend_from_slice(&sealed.nonce);
    out.extend_from_slice(&sealed.tag);
    out.extend_from_slice(mac.as_ref());
    out.extend_from_slice(&meta_len.to_be_bytes());
    out.extend_from_slice(&metadata);
    out.extend_from_slice(&sealed.ciphertext);
    Ok(out)
}

/// Decrypt an envelope and return only the plaintext.
pub fn decode(bytes: &[u8], key: &[u8; KEY_LEN]) -> Result<Zeroizing<Vec<u8>>, CofferError> {
    Ok(open(bytes, key)?.plaintext)
}

/// Decrypt an envelope, returning metadata and plaintext.
///
/// Errors: `InvalidEncryptionFormat` for truncation, unknown version or a
/// malformed header; `DecryptionFailed` when the AEAD tag does not verify;
/// `FileCorrupted` when the plaintext HMAC does not match.
pub fn open(bytes: &[u8], key: &[u8; KEY_LEN]) -> Result<Opened, CofferError> {
    let (meta_bytes, body) = split(bytes)?;
    let metadata: EnvelopeMetadata = serde_json::from_slice(meta_bytes).map_err(|e| {
        CofferError::InvalidEncryptionFormat(format!("unreadable envelope metadata: {e}"))
    })?;

    let nonce = fixed::<NONCE_LEN>(&bytes[NONCE_AT..TAG_AT]);
    let tag = fixed::<TAG_LEN>(&bytes[TAG_AT..HMAC_AT]);
    let plaintext = Zeroizing::new(crypto::open(key, &nonce, meta_bytes, body, &tag)?);

    hmac::verify(&integrity_key(key)?, &plaintext, &bytes[HMAC_AT..META_LEN_AT]).map_err(|_| {
        CofferError::FileCorrupted("envelope integrity check failed".to_string())
    })?;

    Ok(Opened {
        metadata,
        plaintext,
    })
}

/// Read the metadata block without decrypting.
pub fn peek_metadata(bytes: &[u8]) -> Result<EnvelopeMetadata, CofferError> {
    let (meta_bytes, _) = split(bytes)?;
    serde_json::from_slice(meta_bytes).map_err(|e| {
        CofferError::InvalidEncryptionFormat(format!("unreadable envelope metadata: {e}"))
    })
}

/// Cheap sniff: right version byte and a plausible metadata length.
pub fn is_envelope(bytes: &[u8]) -> bool {
    split(bytes).is_ok()
}

fn split(bytes: &[u8]) -> Result<(&[u8], &[u8]), CofferError> {
    if bytes.len() < HEADER_LEN {
        return Err(CofferError::InvalidEncryptionFormat(format!(
            "envelope too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0] != VERSION {
        return Err(CofferError::InvalidEncryptionFormat(format!(
            "unsupported envelope version {}",
            bytes[0]
        )));
    }
    let meta_len = u32::from_be_bytes(fixed::<4>(&bytes[META_LEN_AT..HEADER_LEN])) as usize;
    if meta_len == 0 || meta_len > MAX_METADATA_LEN || HEADER_LEN + meta_len > bytes.len() {
        return Err(CofferError::InvalidEncryptionFormat(format!(
            "implausible metadata length {meta_len}"
        )));
    }
    Ok(bytes[HEADER_LEN..].split_at(meta_len))
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Seal a single password for storage in `PasswordEntry::encrypted_password`.
pub fn encrypt_password(password: &str, key: &[u8; KEY_LEN]) -> Result<String, CofferError> {
    let bytes = encode(password.as_bytes(), key, ContentType::Password)?;
    Ok(BASE64.encode(bytes))
}

/// Reverse of [`encrypt_password`].
pub fn decrypt_password(sealed: &str, key: &[u8; KEY_LEN]) -> Result<SecretString, CofferError> {
    let bytes = BASE64.decode(sealed.trim()).map_err(|e| {
        CofferError::InvalidEncryptionFormat(format!("sealed password is not base64: {e}"))
    })?;
    let plaintext = decode(&bytes, key)?;
    let text = String::from_utf8(plaintext.to_vec())
        .map_err(|_| CofferError::FileCorrupted("sealed password is not UTF-8".to_string()))?;
    Ok(SecretString::from(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::ErrorKind;
    use proptest::prelude::*;
    use secrecy::ExposeSecret;

    const KEY: [u8; 32] = [0x11; 32];

    #[test]
    fn layout_matches_documented_offsets() {
        let bytes = encode(b"hello", &KEY, ContentType::Vault).unwrap();
        assert_eq!(bytes[0], VERSION);
        assert_eq!(HEADER_LEN, 65);
        let meta = peek_metadata(&bytes).unwrap();
        assert_eq!(meta.content_type, ContentType::Vault);
        assert_eq!(meta.kdf, "PBKDF2-HMAC-SHA256");
        assert_eq!(meta.iterations, 100_000);
        let meta_len = u32::from_be_bytes(fixed::<4>(&bytes[61..65])) as usize;
        assert_eq!(bytes.len(), HEADER_LEN + meta_len + 5);
    }

    #[test]
    fn wrong_key_is_decryption_failed() {
        let bytes = encode(b"hello", &KEY, ContentType::Vault).unwrap();
        let err = decode(&bytes, &[0x22; 32]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn truncated_and_foreign_input_is_invalid_format() {
        let bytes = encode(b"hello", &KEY, ContentType::Vault).unwrap();
        for input in [&bytes[..10], &bytes[..HEADER_LEN], b"[{\"service\":1}]".as_slice()] {
            let err = decode(input, &KEY).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidEncryptionFormat);
        }
        let mut wrong_version = bytes.clone();
        wrong_version[0] = 2;
        assert_eq!(
            decode(&wrong_version, &KEY).unwrap_err().kind(),
            ErrorKind::InvalidEncryptionFormat
        );
    }

    #[test]
    fn hmac_mismatch_is_file_corrupted() {
        let mut bytes = encode(b"hello", &KEY, ContentType::Vault).unwrap();
        bytes[HMAC_AT] ^= 0x01;
        assert_eq!(decode(&bytes, &KEY).unwrap_err().kind(), ErrorKind::FileCorrupted);
    }

    #[test]
    fn sniffer_distinguishes_envelopes_from_legacy_text() {
        let bytes = encode(b"[]", &KEY, ContentType::Vault).unwrap();
        assert!(is_envelope(&bytes));
        assert!(!is_envelope(b"Mail - a@b.com - abcdef"));
        assert!(!is_envelope(b"[]"));
        assert!(!is_envelope(&[]));
    }

    #[test]
    fn password_sealing_round_trips() {
        let sealed = encrypt_password("hunter2hunter2", &KEY).unwrap();
        assert_ne!(sealed, "hunter2hunter2");
        let opened = decrypt_password(&sealed, &KEY).unwrap();
        assert_eq!(opened.expose_secret(), "hunter2hunter2");
        assert!(decrypt_password("not base64!", &KEY).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..2048), key in any::<[u8; 32]>()) {
            let bytes = encode(&plaintext, &key, ContentType::Backup).unwrap();
            let decoded = decode(&bytes, &key).unwrap();
            prop_assert_eq!(decoded.as_slice(), plaintext.as_slice());
        }

        #[test]
        fn any_flipped_byte_is_rejected(plaintext in proptest::collection::vec(any::<u8>(), 1..256), pos in any::<prop::sample::Index>(), bit in 0u8..8) {
            let mut bytes = encode(&plaintext, &KEY, ContentType::Vault).unwrap();
            let i = pos.index(bytes.len());
            bytes[i] ^= 1 << bit;
            let err = decode(&bytes, &KEY).unwrap_err();
            let allowed = if i == 0 {
                err.kind() == ErrorKind::InvalidEncryptionFormat
            } else {
                matches!(
                    err.kind(),
                    ErrorKind::DecryptionFailed | ErrorKind::FileCorrupted | ErrorKind::InvalidEncryptionFormat
                )
            };
            prop_assert!(allowed, "byte {} produced {:?}", i, err.kind());
        }
    }
}
