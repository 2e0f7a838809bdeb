// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with "did you mean?" suggestions.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::Diagnostic;
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A configuration error with diagnostic help text.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{path}`")]
    #[diagnostic(
        code(coffer::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// Dotted path of the unrecognized key.
        path: String,
        /// Closest valid key, if any is similar enough.
        suggestion: Option<String>,
        /// Valid keys for the enclosing section.
        valid_keys: String,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for `{path}`: found {found}")]
    #[diagnostic(code(coffer::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        path: String,
        found: String,
        expected: String,
    },

    /// A semantic constraint failed after deserialization.
    #[error("validation error: {message}")]
    #[diagnostic(code(coffer::config::validation))]
    Validation { message: String },

    /// Anything else figment reports.
    #[error("configuration error: {0}")]
    #[diagnostic(code(coffer::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let mut path: Vec<String> = error.path.clone();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    path.push(field.clone());
                    ConfigError::UnknownKey {
                        path: path.join("."),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                    }
                }
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    path: path.join("."),
                    found: actual.to_string(),
                    expected: expected.clone(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Suggest the closest valid key using Jaro-Winkler similarity.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        if handler.render_report(&mut buf, error as &dyn Diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
