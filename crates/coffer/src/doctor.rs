// SPDX-FileCopyrightText: 2026 Coffer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `coffer doctor` output.

use std::io::IsTerminal;

use coffer_vault::{CheckResult, CheckStatus, IntegrityReport};

/// Print one line per check and a summary.
pub fn print_report(report: &IntegrityReport, plain: bool) {
    let use_color = !plain && std::io::stdout().is_terminal();

    println!();
    println!("  coffer doctor");
    println!("  {}", "-".repeat(50));
    for result in &report.checks {
        println!("{}", render_line(result, use_color));
    }
    println!();

    let issues = report.count(CheckStatus::Fail) + report.count(CheckStatus::Warn);
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<24} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<24} {} ({duration_ms}ms)", result.name, result.message)
    }
}
