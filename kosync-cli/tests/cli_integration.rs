//! CLI integration tests for kosync.
//!
//! These tests run the actual binary and check outputs and exit codes.
//! Commands that need PostgreSQL are only exercised up to the point where
//! the missing connection string is reported.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// MD5 of "hello world"; small files are sampled in a single window
const HELLO_CONTENT_FP: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
/// MD5 of "book.epub"
const BOOK_NAME_FP: &str = "03053ffc045564439ff7f2cabb3b58c5";

/// Get a Command for the kosync binary with no database configured.
fn kosync() -> Command {
    let mut cmd = Command::cargo_bin("kosync").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("LIBRARY_ROOT")
        .env_remove("RUST_LOG");
    cmd
}

fn book(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("book.epub");
    fs::write(&path, b"hello world").unwrap();
    path
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    kosync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("KOReader progress sync"))
        .stdout(predicate::str::contains("fingerprint"))
        .stdout(predicate::str::contains("backfill"))
        .stdout(predicate::str::contains("prune"));
}

#[test]
fn test_version_displays_version() {
    kosync()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kosync"));
}

#[test]
fn test_help_shows_exit_codes() {
    kosync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("66"))
        .stdout(predicate::str::contains("78"));
}

#[test]
fn test_backfill_help_shows_options() {
    kosync()
        .args(["backfill", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--owner"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--batch-size"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    kosync().arg("frobnicate").assert().code(64);
}

#[test]
fn test_zero_batch_size_is_usage_error() {
    kosync()
        .args(["backfill", "--batch-size", "0"])
        .assert()
        .code(64);
}

#[test]
fn test_key_and_password_conflict() {
    kosync()
        .args(["user", "add", "alice", "--key", "k", "--password", "p"])
        .assert()
        .code(64);
}

// ============================================================================
// Fingerprint Tests
// ============================================================================

#[test]
fn test_fingerprint_prints_both_fingerprints() {
    let dir = TempDir::new().unwrap();
    let file = book(&dir);

    kosync()
        .args(["--color=never", "fingerprint"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(HELLO_CONTENT_FP))
        .stdout(predicate::str::contains(BOOK_NAME_FP));
}

#[test]
fn test_fingerprint_json_output() {
    let dir = TempDir::new().unwrap();
    let file = book(&dir);

    let output = kosync()
        .args(["fingerprint", "--json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["content"], HELLO_CONTENT_FP);
    assert_eq!(json["name"], BOOK_NAME_FP);
    assert_eq!(json["size"], 11);
}

#[test]
fn test_fingerprint_missing_file_returns_input_error() {
    kosync()
        .args(["fingerprint", "/nonexistent/book.epub"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_fingerprint_empty_file_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("empty.epub");
    fs::write(&file, b"").unwrap();

    kosync()
        .arg("fingerprint")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot fingerprint contents"));
}

// ============================================================================
// Admin commands without a database
// ============================================================================

#[test]
fn test_user_add_requires_database_url() {
    kosync()
        .args(["user", "add", "alice", "--password", "secret"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_backfill_requires_database_url() {
    kosync().arg("backfill").assert().code(78);
}

#[test]
fn test_prune_requires_database_url() {
    kosync().args(["prune", "alice"]).assert().code(78);
}

#[test]
fn test_progress_requires_database_url() {
    kosync().args(["progress", "alice", "1"]).assert().code(78);
}

#[test]
fn test_user_add_requires_a_credential() {
    kosync()
        .args(["user", "add", "alice"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--key or --password"));
}

// ============================================================================
// Output Mode Tests
// ============================================================================

#[test]
fn test_quiet_mode_minimal_output() {
    let dir = TempDir::new().unwrap();
    let file = book(&dir);

    kosync()
        .args(["--quiet", "fingerprint"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_color_never_no_ansi() {
    let dir = TempDir::new().unwrap();
    let file = book(&dir);

    kosync()
        .args(["--color=never", "fingerprint"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[").not());
}
