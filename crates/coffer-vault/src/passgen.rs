// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Random password generation from the OS RNG.

use coffer_core::CofferError;
use rand::Rng;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use secrecy::SecretString;

/// Length used when the caller does not ask for one.
pub const DEFAULT_LENGTH: usize = 12;

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

/// Generate a password of `length` characters containing at least one
/// lowercase letter, uppercase letter, digit and symbol.
pub fn generate_password(length: usize) -> Result<SecretString, CofferError> {
    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    if length < classes.len() {
        return Err(CofferError::Config(format!(
            "password length must be at least {}",
            classes.len()
        )));
    }
    let all: Vec<u8> = classes.concat();
    let mut rng = OsRng;

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    let password = String::from_utf8(chars)
        .map_err(|e| CofferError::Internal(format!("generated password is not UTF-8: {e}")))?;
    Ok(SecretString::from(password))
}
