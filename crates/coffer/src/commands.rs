// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand handlers.

use coffer_config::model::CofferConfig;
use coffer_core::CofferError;
use coffer_vault::legacy::UnsealedPasswords;
use coffer_vault::migration::MigrationOutcome;
use coffer_vault::{AttemptBudget, Vault, prompt};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::{BackupAction, Commands};

pub async fn run(command: Commands, config: &CofferConfig) -> Result<(), CofferError> {
    let secrets = coffer_secrets::select_secret_store(config)?;
    let vault = Vault::open(config, secrets)?;

    match command {
        Commands::Init => init(&vault).await,
        Commands::Unlock => {
            unlock(&vault).await?;
            println!("Master password accepted.");
            Ok(())
        }
        Commands::Add {
            service,
            identifier,
            prompt: ask,
            length,
        } => {
            unlock(&vault).await?;
            let password = new_entry_password(ask, length)?;
            vault.add_entry(&service, &identifier, &password).await?;
            if ask {
                println!("Added {service} / {identifier}.");
            } else {
                println!("Added {service} / {identifier}: {}", password.expose_secret());
            }
            Ok(())
        }
        Commands::Get {
            service,
            identifier,
        } => {
            unlock(&vault).await?;
            let password = vault.get_password(&service, &identifier).await?;
            println!("{}", password.expose_secret());
            Ok(())
        }
        Commands::List { service, search } => {
            unlock(&vault).await?;
            let entries = match (service, search) {
                (Some(service), _) => vault.find_by_service(&service).await?,
                (None, Some(needle)) => vault.search(&needle).await?,
                (None, None) => vault.list_entries().await?,
            };
            if entries.is_empty() {
                println!("No entries.");
            }
            for entry in entries {
                let accessed = entry.last_accessed.as_deref().unwrap_or("never");
                println!(
                    "{:<24} {:<32} updated {}  accessed {accessed}",
                    entry.service, entry.identifier, entry.updated_at
                );
            }
            Ok(())
        }
        Commands::Update {
            service,
            identifier,
            prompt: ask,
            length,
        } => {
            unlock(&vault).await?;
            let password = new_entry_password(ask, length)?;
            vault.update_password(&service, &identifier, &password).await?;
            if ask {
                println!("Updated {service} / {identifier}.");
            } else {
                println!("Updated {service} / {identifier}: {}", password.expose_secret());
            }
            Ok(())
        }
        Commands::Rename {
            service,
            from,
            to,
        } => {
            unlock(&vault).await?;
            vault.rename_entry(&service, &from, &to).await?;
            println!("Renamed {service} / {from} to {to}.");
            Ok(())
        }
        Commands::Remove {
            service,
            identifier,
        } => {
            unlock(&vault).await?;
            if vault.remove_entry(&service, &identifier).await? {
                println!("Removed {service} / {identifier}.");
                Ok(())
            } else {
                Err(CofferError::NotFound(format!("`{service}` / `{identifier}`")))
            }
        }
        Commands::Migrate { yes, plaintext } => {
            unlock(&vault).await?;
            let confirm = |question: &str| yes || prompt::confirm(question);
            let unsealed = if plaintext {
                UnsealedPasswords::Seal
            } else {
                UnsealedPasswords::Refuse
            };
            report_migration(vault.migrate(&confirm, unsealed).await?);
            Ok(())
        }
        Commands::Rollback => {
            unlock(&vault).await?;
            vault.rollback().await?;
            println!("Rolled back to the flat-file vault.");
            Ok(())
        }
        Commands::Backup { action } => backup(&vault, action).await,
        Commands::Recover => {
            unlock(&vault).await?;
            let source = vault.recover_database().await?;
            println!("Database rebuilt from {source:?}.");
            Ok(())
        }
        Commands::Passwd => {
            let current = unlock(&vault).await?;
            let new = prompt::get_new_master_password("New master password")?;
            vault.change_master_password(&current, &new).await?;
            println!("Master password changed.");
            Ok(())
        }
        Commands::RestoreKey => {
            let key = prompt::read_secret("Recovery key")?;
            vault.restore_recovery_key(&key).await?;
            println!("Application secret restored. Run `coffer init` if the hash is also missing.");
            Ok(())
        }
        Commands::Wipe { yes } => {
            if !(yes || prompt::confirm("Delete the application secret? The vault becomes unreadable without the recovery key.")) {
                println!("Aborted.");
                return Ok(());
            }
            vault.wipe_credentials().await?;
            println!("Authentication material deleted.");
            Ok(())
        }
        Commands::Doctor { plain } => {
            // Integrity checks run without a session; offer to unlock for deeper ones.
            if vault.is_initialized().await.unwrap_or(false) {
                if let Ok(password) = prompt::get_master_password() {
                    if let Err(e) = vault.unlock(&password).await {
                        warn!(error = %e, "doctor continuing without a session");
                    }
                }
            }
            let report = vault.check_integrity().await;
            crate::doctor::print_report(&report, plain);
            if report.ok() {
                Ok(())
            } else {
                Err(CofferError::FileCorrupted(format!(
                    "{} check(s) failed",
                    report.count(coffer_vault::CheckStatus::Fail)
                )))
            }
        }
    }
}

async fn init(vault: &Vault) -> Result<(), CofferError> {
    if vault.is_initialized().await? {
        return Err(CofferError::AuthenticationFailed(
            "vault is already set up; use `coffer passwd` to change the password".to_string(),
        ));
    }
    let password = prompt::get_new_master_password("New master password")?;
    let recovery = vault.setup(&password).await?;
    println!("Vault created.");
    println!();
    println!("Recovery key (store it offline, it is not shown again):");
    println!("  {}", recovery.expose_secret());
    Ok(())
}

/// Prompt for the master password until it verifies or the attempt budget
/// runs out. Exhausting the budget ends the process.
async fn unlock(vault: &Vault) -> Result<SecretString, CofferError> {
    if !vault.is_initialized().await? {
        return Err(CofferError::AuthenticationFailed(
            "vault is not set up; run `coffer init`".to_string(),
        ));
    }
    let mut budget = AttemptBudget::default();
    loop {
        let password = prompt::get_master_password()?;
        match vault.unlock(&password).await {
            Ok(()) => return Ok(password),
            Err(CofferError::AuthenticationFailed(reason)) => {
                if !budget.record_failure() {
                    eprintln!("error [AUTHENTICATION_FAILED]: too many failed attempts");
                    std::process::exit(1);
                }
                eprintln!("{reason}; {} attempt(s) left", budget.remaining());
            }
            Err(e) => return Err(e),
        }
    }
}

fn new_entry_password(ask: bool, length: usize) -> Result<SecretString, CofferError> {
    if ask {
        let password = prompt::read_secret("Entry password")?;
        if password.expose_secret().is_empty() {
            return Err(CofferError::Config("empty password not allowed".to_string()));
        }
        Ok(password)
    } else {
        coffer_vault::generate_password(length)
    }
}

fn report_migration(outcome: MigrationOutcome) {
    match outcome {
        MigrationOutcome::Migrated(report) => {
            println!(
                "Migrated {} entries ({} verified by decryption).",
                report.migrated, report.verified_samples
            );
            if let Some(snapshot) = report.snapshot {
                println!("Pre-migration snapshot: {}", snapshot.display());
            }
            for warning in report.warnings {
                println!("warning: {warning}");
            }
        }
        MigrationOutcome::Aborted(reason) => println!("Migration not performed: {reason}."),
        MigrationOutcome::Recovered(source) => {
            println!("No flat file to migrate; database rebuilt from {source:?}.")
        }
    }
}

async fn backup(vault: &Vault, action: BackupAction) -> Result<(), CofferError> {
    match action {
        BackupAction::Create => {
            unlock(vault).await?;
            let info = vault.create_backup().await?;
            println!("Backup written: {}", info.path.display());
        }
        BackupAction::List => {
            let backups = vault.list_backups()?;
            if backups.is_empty() {
                println!("No backups.");
            }
            for info in backups {
                println!(
                    "{:<44} {:>8} bytes  {}",
                    info.file_name,
                    info.size,
                    info.created_at.as_deref().unwrap_or("unknown")
                );
            }
        }
        BackupAction::Restore { path } => {
            unlock(vault).await?;
            let restored = vault.backups().restore_backup(&path, false).await?;
            println!("Restored {restored} entries from {}.", path.display());
        }
        BackupAction::Delete { path } => {
            unlock(vault).await?;
            vault.backups().delete_backup(&path).await?;
            println!("Deleted {}.", path.display());
        }
    }
    Ok(())
}
