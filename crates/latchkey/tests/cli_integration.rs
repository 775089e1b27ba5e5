//! CLI integration tests for the latchkey command-line interface.
//!
//! These tests never reach an OAuth provider: sessions are seeded directly
//! into the token file, and commands that would need the network are only
//! run far enough to check their argument and config handling.

use std::path::Path;

use assert_cmd::Command;
use chrono::Utc;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the latchkey binary, isolated in `dir`.
fn latchkey(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("latchkey").unwrap();
    cmd.current_dir(dir)
        .env_remove("LATCHKEY_CONFIG_DIR")
        .env_remove("LATCHKEY_CLIENT_SECRET")
        .arg("--config-dir")
        .arg(dir);
    cmd
}

fn write_config(dir: &Path, contents: &str) {
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

fn seed_session(dir: &Path, access_token: &str, expires_in_secs: i64) {
    let expires_at = (Utc::now() + chrono::Duration::seconds(expires_in_secs)).to_rfc3339();
    let tokens = serde_json::json!({
        "access_token": access_token,
        "refresh_token": "refresh-abc",
        "access_expires_at_utc": expires_at,
    });
    std::fs::write(dir.join("tokens.json"), tokens.to_string()).unwrap();
}

const CLIENT_CONFIG: &str = r#"
[oauth]
client_id = "cli-test-client"
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"))
        .stdout(predicate::str::contains("token"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("latchkey"));
}

#[test]
fn test_auth_help_lists_actions() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .args(["auth", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("logout"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path()).arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Status / Logout
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_without_session() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not authenticated"));
}

#[test]
fn test_status_shows_masked_token() {
    let dir = TempDir::new().unwrap();
    seed_session(dir.path(), "ya29.abcdefghijklmnopqrstuvwxyz", 3600);

    latchkey(dir.path())
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("authenticated"))
        .stdout(predicate::str::contains("ya29...wxyz"))
        .stdout(predicate::str::contains("abcdefghijklmnop").not())
        .stdout(predicate::str::contains("Refresh token: present"));
}

#[test]
fn test_logout_without_session() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No session found"));
}

#[test]
fn test_logout_removes_token_file() {
    let dir = TempDir::new().unwrap();
    seed_session(dir.path(), "ya29.abcdefghijklmnopqrstuvwxyz", 3600);

    latchkey(dir.path())
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!dir.path().join("tokens.json").exists());
}

#[test]
fn test_corrupt_token_file_reads_as_signed_out() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tokens.json"), "{ not json").unwrap();

    latchkey(dir.path())
        .args(["auth", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not authenticated"));
}

#[test]
fn test_logout_erases_corrupt_token_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tokens.json"), "{ not json").unwrap();

    latchkey(dir.path())
        .args(["auth", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No session found"));

    assert!(!dir.path().join("tokens.json").exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_token_requires_client_id() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .arg("token")
        .assert()
        .failure()
        .stderr(predicate::str::contains("client_id"));
}

#[test]
fn test_token_without_session_fails() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        &format!("{CLIENT_CONFIG}\n[storage]\nbackend = \"memory\"\n"),
    );

    latchkey(dir.path())
        .arg("token")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid session"));
}

#[test]
fn test_token_prints_stored_access_token() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), CLIENT_CONFIG);
    seed_session(dir.path(), "ya29.still-valid-token", 3600);

    latchkey(dir.path())
        .arg("token")
        .assert()
        .success()
        .stdout("ya29.still-valid-token\n");
}

#[test]
fn test_login_requires_client_id() {
    let dir = TempDir::new().unwrap();
    latchkey(dir.path())
        .args(["auth", "login"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("client_id"));
}

#[test]
fn test_login_skips_when_already_authenticated() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), CLIENT_CONFIG);
    seed_session(dir.path(), "ya29.abcdefghijklmnopqrstuvwxyz", 3600);

    latchkey(dir.path())
        .args(["auth", "login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already authenticated"));
}

#[test]
fn test_keyring_backend_without_feature() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "[storage]\nbackend = \"keyring\"\n");

    if cfg!(feature = "keyring") {
        return;
    }
    latchkey(dir.path())
        .args(["auth", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("keyring support not compiled in"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_which_lists_layers() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), CLIENT_CONFIG);

    latchkey(dir.path())
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml  (loaded)"))
        .stdout(predicate::str::contains("latchkey.toml  (not found)"));
}

#[test]
fn test_config_which_reports_broken_layer() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), CLIENT_CONFIG);
    std::fs::write(dir.path().join("latchkey.toml"), "[oauth\nbroken").unwrap();

    latchkey(dir.path())
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("latchkey.toml  (ignored:"));
}

#[test]
fn test_config_show_redacts_secret() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        "[oauth]\nclient_id = \"cli-test-client\"\nclient_secret = \"hunter2\"\n",
    );

    latchkey(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cli-test-client"))
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_show_project_layer_overrides_user() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), CLIENT_CONFIG);
    std::fs::write(
        dir.path().join("latchkey.toml"),
        "[oauth]\nclient_id = \"project-client\"\n",
    )
    .unwrap();

    latchkey(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# project config:"))
        .stdout(predicate::str::contains("project-client"))
        .stdout(predicate::str::contains("cli-test-client").not());
}
