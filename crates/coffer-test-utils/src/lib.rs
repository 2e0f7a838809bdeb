// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Coffer integration tests.
//!
//! [`TestVault`] gives each test its own data directory, an in-memory
//! secret store, and optionally an already set-up, unlocked vault.

pub mod harness;

pub use harness::{TEST_PASSWORD, TestVault, TestVaultBuilder};
