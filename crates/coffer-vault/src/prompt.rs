// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master-password acquisition via TTY prompt or the `COFFER_MASTER_PASSWORD`
//! environment variable.

use std::io::{BufRead, IsTerminal, Write};

use coffer_core::CofferError;
use secrecy::SecretString;

/// Environment variable consulted before prompting.
pub const MASTER_PASSWORD_ENV_VAR: &str = "COFFER_MASTER_PASSWORD";

fn from_env() -> Option<SecretString> {
    match std::env::var(MASTER_PASSWORD_ENV_VAR) {
        Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
        _ => None,
    }
}

fn read_hidden(label: &str) -> Result<String, CofferError> {
    eprint!("{label}: ");
    rpassword::read_password().map_err(|e| CofferError::io("reading password from terminal", e))
}

fn no_source() -> CofferError {
    CofferError::AuthenticationFailed(format!(
        "no master password provided; set {MASTER_PASSWORD_ENV_VAR} or run interactively"
    ))
}

/// Get the master password from the environment or an interactive prompt.
pub fn get_master_password() -> Result<SecretString, CofferError> {
    if let Some(password) = from_env() {
        return Ok(password);
    }
    if !std::io::stdin().is_terminal() {
        return Err(no_source());
    }
    let password = read_hidden("Master password")?;
    if password.is_empty() {
        return Err(CofferError::AuthenticationFailed("empty password not allowed".to_string()));
    }
    Ok(SecretString::from(password))
}

/// Like [`get_master_password`] but prompts twice when interactive.
pub fn get_new_master_password(label: &str) -> Result<SecretString, CofferError> {
    if let Some(password) = from_env() {
        return Ok(password);
    }
    if !std::io::stdin().is_terminal() {
        return Err(no_source());
    }
    let first = read_hidden(label)?;
    let second = read_hidden("Confirm")?;
    if first != second {
        return Err(CofferError::AuthenticationFailed("passwords do not match".to_string()));
    }
    if first.is_empty() {
        return Err(CofferError::AuthenticationFailed("empty password not allowed".to_string()));
    }
    Ok(SecretString::from(first))
}

/// Prompt for an arbitrary hidden value such as a stored password.
pub fn read_secret(label: &str) -> Result<SecretString, CofferError> {
    if !std::io::stdin().is_terminal() {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| CofferError::io("reading secret from stdin", e))?;
        return Ok(SecretString::from(line.trim_end_matches(['\r', '\n']).to_string()));
    }
    Ok(SecretString::from(read_hidden(label)?))
}

/// Ask a yes/no question on the terminal. Non-interactive callers get `false`.
pub fn confirm(question: &str) -> bool {
    if !std::io::stdin().is_terminal() {
        return false;
    }
    eprint!("{question} [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn password_from_env_var() {
        // SAFETY: serialized test; nothing else touches the environment.
        unsafe { std::env::set_var(MASTER_PASSWORD_ENV_VAR, "from-env") };
        let result = get_master_password();
        unsafe { std::env::remove_var(MASTER_PASSWORD_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "from-env");
    }

    #[test]
    #[serial]
    fn new_password_from_env_var_skips_confirmation() {
        unsafe { std::env::set_var(MASTER_PASSWORD_ENV_VAR, "from-env") };
        let result = get_new_master_password("New master password");
        unsafe { std::env::remove_var(MASTER_PASSWORD_ENV_VAR) };

        assert!(result.is_ok());
    }

    #[test]
    fn missing_source_names_the_variable() {
        let err = no_source();
        assert!(err.to_string().contains(MASTER_PASSWORD_ENV_VAR));
    }
}
