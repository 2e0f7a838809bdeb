// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coffer - a local secrets vault.
//!
//! This is the binary entry point. Configuration errors are rendered as
//! diagnostics; engine errors print their stable kind code and exit with 1.

mod commands;
mod doctor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Coffer - a local secrets vault.
#[derive(Parser, Debug)]
#[command(name = "coffer", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Set up the master password for a new vault.
    Init,
    /// Check the master password.
    Unlock,
    /// Store a new entry. Without --prompt a password is generated.
    Add {
        service: String,
        identifier: String,
        /// Read the password from the terminal (or stdin) instead of generating one.
        #[arg(long)]
        prompt: bool,
        /// Length of the generated password.
        #[arg(long, default_value_t = coffer_vault::passgen::DEFAULT_LENGTH)]
        length: usize,
    },
    /// Print the password of an entry.
    Get { service: String, identifier: String },
    /// List entries, optionally filtered.
    List {
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Replace the password of an entry with a generated or prompted one.
    Update {
        service: String,
        identifier: String,
        #[arg(long)]
        prompt: bool,
        #[arg(long, default_value_t = coffer_vault::passgen::DEFAULT_LENGTH)]
        length: usize,
    },
    /// Rename an entry's identifier.
    Rename {
        service: String,
        from: String,
        to: String,
    },
    /// Delete an entry.
    Remove { service: String, identifier: String },
    /// Move a flat-file vault into the encrypted database.
    Migrate {
        /// Overwrite an existing populated database without asking.
        #[arg(long)]
        yes: bool,
        /// The flat file holds plaintext passwords; seal them while migrating.
        #[arg(long)]
        plaintext: bool,
    },
    /// Undo a migration and restore the archived flat file.
    Rollback,
    /// Manage backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Rebuild the database from the archive or the newest usable backup.
    Recover,
    /// Change the master password and re-encrypt everything.
    Passwd,
    /// Re-import the application secret from a recovery key.
    RestoreKey,
    /// Delete the application secret and authentication hash.
    Wipe {
        #[arg(long)]
        yes: bool,
    },
    /// Run integrity checks.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Snapshot the vault now.
    Create,
    /// List retained backups, newest first.
    List,
    /// Replace the vault contents with a backup.
    Restore { path: PathBuf },
    /// Delete one backup.
    Delete { path: PathBuf },
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("coffer={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => coffer_config::load_and_validate_path(path),
        None => coffer_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            coffer_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.log.level);

    if let Err(e) = commands::run(cli.command, &config).await {
        eprintln!("error [{}]: {e}", e.kind());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_defaults_to_generated_twelve_characters() {
        let cli = Cli::try_parse_from(["coffer", "add", "Mail", "a@b.com"]).unwrap();
        match cli.command {
            Commands::Add { prompt, length, .. } => {
                assert!(!prompt);
                assert_eq!(length, 12);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn backup_restore_takes_a_path() {
        let cli =
            Cli::try_parse_from(["coffer", "backup", "restore", "/tmp/backup-x.enc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backup {
                action: BackupAction::Restore { .. }
            }
        ));
    }

    #[test]
    fn migrate_refuses_unsealed_passwords_unless_asked() {
        let cli = Cli::try_parse_from(["coffer", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate { plaintext: false, .. }));
        let cli = Cli::try_parse_from(["coffer", "migrate", "--plaintext"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate { plaintext: true, .. }));
    }
}
