// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests over the assembled engine.
//!
//! Each test gets an isolated TestVault with its own data directory and an
//! in-memory secret store. Tests are independent and order-insensitive.

use coffer_config::model::StorageBackend;
use coffer_core::{BackendKind, CofferError};
use coffer_test_utils::{TEST_PASSWORD, TestVault};
use coffer_vault::envelope;
use coffer_vault::UnsealedPasswords;
use coffer_vault::migration::MigrationOutcome;
use secrecy::{ExposeSecret, SecretString};

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

// ---- First run through add and lookup ----

#[tokio::test]
async fn first_run_setup_add_and_find() {
    for backend in [StorageBackend::File, StorageBackend::Relational] {
        let harness = TestVault::builder().with_backend(backend).build().unwrap();
        let vault = &harness.vault;

        assert!(!vault.is_initialized().await.unwrap());
        vault.setup(&secret("Abc12345!")).await.unwrap();
        assert!(vault.authenticator().verify(&secret("Abc12345!")).await);
        assert!(!vault.authenticator().verify(&secret("wrong")).await);
        assert!(vault.authenticator().verify(&secret("Abc12345!")).await);

        let generated = coffer_vault::generate_password(12).unwrap();
        assert_eq!(generated.expose_secret().len(), 12);
        vault.add_entry("Mail", "a@b.com", &generated).await.unwrap();

        let entry = vault
            .repository()
            .find_by_service_and_identifier("Mail", "a@b.com")
            .await
            .unwrap()
            .unwrap();
        let key = vault.session().encryption_key().unwrap();
        let decrypted = envelope::decrypt_password(&entry.encrypted_password, &key).unwrap();
        assert_eq!(decrypted.expose_secret(), generated.expose_secret());

        let dup = vault
            .add_entry("Mail", "a@b.com", &secret("other"))
            .await
            .unwrap_err();
        assert!(matches!(dup, CofferError::DuplicateIdentifier { .. }));
    }
}

// ---- Legacy flat file through migration and rollback ----

#[tokio::test]
async fn legacy_text_file_migrates_and_rolls_back() {
    let harness = TestVault::builder()
        .with_backend(StorageBackend::File)
        .build_unlocked()
        .await
        .unwrap();
    let vault = &harness.vault;
    let paths = vault.repository().paths();
    std::fs::write(
        paths.vault_file(),
        "Mail - a@b.com - first\nBank - me - second - with dash\nForum - x - third\n",
    )
    .unwrap();

    let outcome = vault.migrate(&|_| false, UnsealedPasswords::Seal).await.unwrap();
    let MigrationOutcome::Migrated(report) = outcome else {
        panic!("expected a migration, got {outcome:?}");
    };
    assert_eq!(report.migrated, 3);
    assert!(report.archived);
    assert_eq!(vault.repository().backend_kind(), BackendKind::Relational);
    assert_eq!(
        vault.get_password("Bank", "me").await.unwrap().expose_secret(),
        "second - with dash"
    );

    vault.rollback().await.unwrap();
    assert!(!paths.database().exists());
    assert!(paths.vault_file().exists());
}

// ---- Backups ----

#[tokio::test]
async fn eleventh_backup_evicts_the_oldest() {
    let harness = TestVault::builder().build_unlocked().await.unwrap();
    let vault = &harness.vault;
    vault.add_entry("Mail", "a", &secret("x")).await.unwrap();

    let mut created = Vec::new();
    for _ in 0..10 {
        created.push(vault.create_backup().await.unwrap().file_name);
        vault.unlock(&TestVault::password()).await.unwrap();
    }
    let oldest = created[0].clone();
    vault.create_backup().await.unwrap();

    let names: Vec<String> = vault
        .list_backups()
        .unwrap()
        .into_iter()
        .map(|b| b.file_name)
        .collect();
    assert_eq!(names.len(), 10);
    assert!(!names.contains(&oldest));
    assert!(names.contains(&created[1]));
}

#[tokio::test]
async fn restore_replaces_contents_and_ends_session() {
    let harness = TestVault::builder().build_unlocked().await.unwrap();
    let vault = &harness.vault;
    vault.add_entry("Mail", "a", &secret("x")).await.unwrap();
    let backup = vault.create_backup().await.unwrap();
    vault.unlock(&TestVault::password()).await.unwrap();
    vault.add_entry("Bank", "b", &secret("y")).await.unwrap();

    let restored = vault.backups().restore_backup(&backup.path, false).await.unwrap();
    assert_eq!(restored, 1);
    assert!(!vault.is_unlocked());

    vault.unlock(&TestVault::password()).await.unwrap();
    let entries = vault.list_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].service, "Mail");
}

#[tokio::test]
async fn creating_a_backup_ends_the_session() {
    let harness = TestVault::builder().build_unlocked().await.unwrap();
    let vault = &harness.vault;
    vault.add_entry("Mail", "a", &secret("x")).await.unwrap();

    vault.create_backup().await.unwrap();
    assert!(!vault.is_unlocked());
    let err = vault.get_password("Mail", "a").await.unwrap_err();
    assert!(matches!(err, CofferError::AuthenticationFailed(_)));

    vault.unlock(&TestVault::password()).await.unwrap();
    assert_eq!(vault.get_password("Mail", "a").await.unwrap().expose_secret(), "x");
}

#[tokio::test]
async fn file_restore_with_auto_backup_snapshots_once() {
    let harness = TestVault::builder()
        .with_backend(StorageBackend::File)
        .with_auto_backup(true)
        .build_unlocked()
        .await
        .unwrap();
    let vault = &harness.vault;
    vault.add_entry("Mail", "a", &secret("x")).await.unwrap();
    let backup = vault.create_backup().await.unwrap();
    vault.unlock(&TestVault::password()).await.unwrap();
    vault.add_entry("Bank", "b", &secret("y")).await.unwrap();

    let before = vault.list_backups().unwrap().len();
    vault.backups().restore_backup(&backup.path, false).await.unwrap();
    assert_eq!(vault.list_backups().unwrap().len(), before + 1);

    vault.unlock(&TestVault::password()).await.unwrap();
    assert_eq!(vault.list_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn backup_paths_outside_the_directory_are_refused() {
    let harness = TestVault::builder().build_unlocked().await.unwrap();
    harness.vault.add_entry("Mail", "a", &secret("x")).await.unwrap();
    harness.vault.create_backup().await.unwrap();
    let outside = harness.vault.repository().paths().database();
    assert!(outside.exists());
    let err = harness.vault.backups().delete_backup(&outside).await.unwrap_err();
    assert!(matches!(err, CofferError::PermissionDenied(_)));
}

// ---- Two handles on one directory ----

#[tokio::test]
async fn second_handle_sees_writes_and_respects_the_lock() {
    let harness = TestVault::builder()
        .with_backend(StorageBackend::File)
        .build_unlocked()
        .await
        .unwrap();
    harness
        .vault
        .add_entry("Mail", "a", &secret("x"))
        .await
        .unwrap();

    let other = harness.reopen().unwrap();
    other.unlock(&secret(TEST_PASSWORD)).await.unwrap();
    assert_eq!(other.get_password("Mail", "a").await.unwrap().expose_secret(), "x");

    let held = harness.vault.repository().lock_manager().guard().await.unwrap();
    let err = other.add_entry("Bank", "b", &secret("y")).await.unwrap_err();
    assert!(matches!(err, CofferError::PermissionDenied(_)));
    drop(held);
    other.add_entry("Bank", "b", &secret("y")).await.unwrap();
}

// ---- Recovery ----

#[tokio::test]
async fn corrupt_database_is_rebuilt_from_a_backup() {
    let harness = TestVault::builder().build_unlocked().await.unwrap();
    let vault = &harness.vault;
    vault.add_entry("Mail", "a", &secret("x")).await.unwrap();
    vault.add_entry("Bank", "b", &secret("y")).await.unwrap();
    vault.create_backup().await.unwrap();
    vault.unlock(&TestVault::password()).await.unwrap();

    vault.repository().close_database().await.unwrap();
    std::fs::write(vault.repository().paths().database(), b"not a database").unwrap();

    let source = vault.recover_database().await.unwrap();
    assert!(matches!(source, coffer_vault::RecoverySource::Backup(_)));
    assert_eq!(vault.list_entries().await.unwrap().len(), 2);
    assert!(vault.check_integrity().await.ok());
}
