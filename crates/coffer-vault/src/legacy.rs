// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reader for the flat-file formats accepted as migration input.
//!
//! Three shapes are recognized: the current envelope-encoded JSON array,
//! a bare JSON array, and the oldest newline-delimited
//! `service - identifier - ciphertext` text. The password field is expected
//! to be a sealed envelope under the session key. A field that is not one
//! is refused, unless the caller declares such fields plaintext, in which
//! case they are sealed as they are read.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use coffer_core::{CofferError, PasswordEntry, timestamp_now};
use tracing::debug;

use crate::crypto::KEY_LEN;
use crate::envelope;

/// Which shape a legacy file had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    Envelope,
    JsonArray,
    DelimitedText,
}

/// What to do with a password field that is not a sealed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsealedPasswords {
    /// Fail the parse with `MigrationFailed`.
    #[default]
    Refuse,
    /// Treat the field as the plaintext password and seal it.
    Seal,
}

const FIELD_SEPARATOR: &str = " - ";

/// Parse a flat vault file into normalized entries.
pub fn parse(
    bytes: &[u8],
    key: &[u8; KEY_LEN],
    unsealed: UnsealedPasswords,
) -> Result<(LegacyFormat, Vec<PasswordEntry>), CofferError> {
    let (format, entries) = if envelope::is_envelope(bytes) {
        let plaintext = envelope::decode(bytes, key)?;
        (LegacyFormat::Envelope, parse_json(&plaintext)?)
    } else {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| CofferError::InvalidEncryptionFormat("vault file is neither an envelope nor text".to_string()))?;
        let trimmed = text.trim_start_matches('\u{feff}').trim();
        if trimmed.starts_with('[') {
            (LegacyFormat::JsonArray, parse_json(trimmed.as_bytes())?)
        } else {
            (LegacyFormat::DelimitedText, parse_lines(trimmed)?)
        }
    };

    let entries = entries
        .into_iter()
        .map(|entry| normalize(entry, key, unsealed))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(?format, entries = entries.len(), "legacy vault parsed");
    Ok((format, entries))
}

fn parse_json(bytes: &[u8]) -> Result<Vec<PasswordEntry>, CofferError> {
    serde_json::from_slice(bytes)
        .map_err(|e| CofferError::FileCorrupted(format!("vault JSON is malformed: {e}")))
}

fn parse_lines(text: &str) -> Result<Vec<PasswordEntry>, CofferError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let mut fields = line.trim().splitn(3, FIELD_SEPARATOR);
            match (fields.next(), fields.next(), fields.next()) {
                (Some(service), Some(identifier), Some(password))
                    if !service.is_empty() && !identifier.is_empty() && !password.is_empty() =>
                {
                    Ok(PasswordEntry::new(service, identifier, password))
                }
                _ => Err(CofferError::FileCorrupted(format!(
                    "line {} is not `service - identifier - password`",
                    n + 1
                ))),
            }
        })
        .collect()
}

/// Apply the unsealed-password policy and fill in missing timestamps.
fn normalize(
    mut entry: PasswordEntry,
    key: &[u8; KEY_LEN],
    unsealed: UnsealedPasswords,
) -> Result<PasswordEntry, CofferError> {
    if !is_sealed(&entry.encrypted_password) {
        match unsealed {
            UnsealedPasswords::Refuse => {
                return Err(CofferError::MigrationFailed(format!(
                    "`{}` / `{}` has a password that is not a sealed envelope",
                    entry.service, entry.identifier
                )));
            }
            UnsealedPasswords::Seal => {
                entry.encrypted_password =
                    envelope::encrypt_password(&entry.encrypted_password, key)?;
            }
        }
    }
    if entry.created_at.is_empty() {
        entry.created_at = timestamp_now();
    }
    if entry.updated_at.is_empty() {
        entry.updated_at = entry.created_at.clone();
    }
    Ok(entry)
}

/// Whether a stored password field is already a base64 envelope.
pub fn is_sealed(field: &str) -> bool {
    BASE64
        .decode(field.trim())
        .map(|bytes| envelope::is_envelope(&bytes))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ContentType, decrypt_password};
    use secrecy::ExposeSecret;

    const KEY: [u8; 32] = [0x33; 32];

    #[test]
    fn declared_plaintext_lines_are_sealed() {
        let text = "Mail - a@b.com - hunter2\n\nBank - me - p - with - dashes\n";
        let (format, entries) = parse(text.as_bytes(), &KEY, UnsealedPasswords::Seal).unwrap();
        assert_eq!(format, LegacyFormat::DelimitedText);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].identifier, "me");
        let pw = decrypt_password(&entries[1].encrypted_password, &KEY).unwrap();
        assert_eq!(pw.expose_secret(), "p - with - dashes");
        assert!(!entries[0].created_at.is_empty());
    }

    #[test]
    fn parses_json_array_keeping_sealed_passwords() {
        let sealed = envelope::encrypt_password("s3cret", &KEY).unwrap();
        let json = format!(
            r#"[{{"service":"Mail","identifier":"a","encryptedPassword":"{sealed}","createdAt":"2024-01-01T00:00:00.000Z"}}]"#
        );
        let (format, entries) = parse(json.as_bytes(), &KEY, UnsealedPasswords::Refuse).unwrap();
        assert_eq!(format, LegacyFormat::JsonArray);
        assert_eq!(entries[0].encrypted_password, sealed);
        assert_eq!(entries[0].updated_at, "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn parses_envelope_file() {
        let rows = vec![PasswordEntry::new("Mail", "a", envelope::encrypt_password("x", &KEY).unwrap())];
        let bytes = envelope::encode(&serde_json::to_vec(&rows).unwrap(), &KEY, ContentType::Vault).unwrap();
        let (format, entries) = parse(&bytes, &KEY, UnsealedPasswords::Refuse).unwrap();
        assert_eq!(format, LegacyFormat::Envelope);
        assert_eq!(entries, rows);
    }

    #[test]
    fn malformed_line_is_reported() {
        let err = parse(b"Mail - only-two", &KEY, UnsealedPasswords::Seal).unwrap_err();
        assert!(matches!(err, CofferError::FileCorrupted(m) if m.contains("line 1")));
    }

    #[test]
    fn unsealed_fields_are_refused_by_default() {
        let err = parse(b"Mail - a@b.com - 9f8e7d6c5b4a", &KEY, UnsealedPasswords::default()).unwrap_err();
        assert!(matches!(err, CofferError::MigrationFailed(m) if m.contains("`Mail` / `a@b.com`")));

        let json = r#"[{"service":"Mail","identifier":"a","encryptedPassword":"plain"}]"#;
        let err = parse(json.as_bytes(), &KEY, UnsealedPasswords::Refuse).unwrap_err();
        assert!(matches!(err, CofferError::MigrationFailed(_)));
    }

    #[test]
    fn sealed_delimited_field_is_kept_as_is() {
        let sealed = envelope::encrypt_password("hunter2", &KEY).unwrap();
        let line = format!("Mail - a@b.com - {sealed}");
        let (_, entries) = parse(line.as_bytes(), &KEY, UnsealedPasswords::Refuse).unwrap();
        assert_eq!(entries[0].encrypted_password, sealed);
    }
}
