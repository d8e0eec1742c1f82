//! Integration tests for the shellvault CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.
//! Passwords come from `SHELLVAULT_PASSWORD` so nothing prompts, and each
//! test writes a `.shellvault.toml` with cheap KDF costs and its own
//! machine-id/boot-id files.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const PASSWORD: &str = "integration-pass";

/// Helper: get a Command pointing at the shellvault binary.
fn shellvault() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("shellvault").expect("binary should exist");
    cmd.env_remove("SHELLVAULT_SESSION")
        .env_remove("SHELLVAULT_PASSWORD")
        .env("USER", "tester");
    cmd
}

/// A project directory with fast settings and fake identity files.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    tmp.child("machine-id").write_str("5f2b6c1a9e8d7c6b5a4f3e2d1c0b9a88\n").unwrap();
    tmp.child("boot_id").write_str("0d9e3c2b-1a4f-4e5d-8c7b-6a5f4e3d2c1b\n").unwrap();

    let config = format!(
        "bcrypt_cost = 4\n\
         pbkdf2_iterations = 1000\n\
         session_bcrypt_cost = 4\n\
         machine_id_path = '{}'\n\
         boot_id_path = '{}'\n",
        tmp.child("machine-id").path().display(),
        tmp.child("boot_id").path().display(),
    );
    tmp.child(".shellvault.toml").write_str(&config).unwrap();
    tmp
}

/// Run `init` in `dir` with the test password.
fn init(dir: &TempDir) {
    shellvault()
        .arg("init")
        .current_dir(dir.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success()
        .stdout(predicate::str::contains("Vault created"));
}

/// Run `login` and return the token from the export line.
fn login(dir: &TempDir) -> String {
    let output = shellvault()
        .arg("login")
        .current_dir(dir.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = stdout.trim();
    line.strip_prefix("export SHELLVAULT_SESSION=")
        .unwrap_or_else(|| panic!("unexpected login output: {line}"))
        .to_string()
}

#[test]
fn help_flag_shows_usage() {
    shellvault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("secrets vault"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("put"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn version_flag_shows_version() {
    shellvault()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shellvault"));
}

#[test]
fn no_args_shows_help() {
    shellvault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn get_on_missing_vault_fails() {
    let tmp = project();
    shellvault()
        .args(["get", "MY_KEY"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Vault not found"));
}

#[test]
fn put_get_list_delete_with_password() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .args(["put", "DB_URL", "postgres://localhost/app"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success()
        .stdout(predicate::str::contains("Secret 'DB_URL' added"));

    shellvault()
        .args(["get", "DB_URL"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success()
        .stdout("postgres://localhost/app\n");

    shellvault()
        .arg("list")
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success()
        .stdout(predicate::str::contains("DB_URL"))
        .stdout(predicate::str::contains("1 secret(s)"));

    shellvault()
        .args(["delete", "DB_URL", "--force"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success();

    shellvault()
        .args(["get", "DB_URL"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn put_reads_piped_value() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .args(["put", "PIPED"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .write_stdin("from-stdin\n")
        .assert()
        .success();

    shellvault()
        .args(["get", "PIPED"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success()
        .stdout("from-stdin\n");
}

#[test]
fn init_twice_fails() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .arg("init")
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_rejects_short_password() {
    let tmp = project();
    shellvault()
        .arg("init")
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", "short")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8"));
}

#[test]
fn wrong_password_fails() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .arg("list")
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", "not-the-password")
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong password"));
}

#[test]
fn session_token_replaces_password_until_logout() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .args(["put", "API_KEY", "sk-live-123"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success();

    let token = login(&tmp);
    assert_eq!(token.len(), 152);

    // No password in the environment: the session token alone unlocks.
    shellvault()
        .args(["get", "API_KEY"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_SESSION", &token)
        .assert()
        .success()
        .stdout("sk-live-123\n");

    shellvault()
        .arg("logout")
        .current_dir(tmp.path())
        .env("SHELLVAULT_SESSION", &token)
        .assert()
        .success()
        .stdout("unset SHELLVAULT_SESSION\n");

    shellvault()
        .args(["get", "API_KEY"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_SESSION", &token)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No active session"));
}

#[test]
fn session_token_does_not_survive_reboot() {
    let tmp = project();
    init(&tmp);
    let token = login(&tmp);

    tmp.child("boot_id")
        .write_str("ffffffff-eeee-4ddd-8ccc-bbbbbbbbbbbb\n")
        .unwrap();

    shellvault()
        .arg("list")
        .current_dir(tmp.path())
        .env("SHELLVAULT_SESSION", &token)
        .assert()
        .failure()
        .stderr(predicate::str::contains("log in again"));
}

#[test]
fn logout_without_session_fails() {
    let tmp = project();
    init(&tmp);

    shellvault()
        .arg("logout")
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No active session"));
}

#[test]
fn id_prints_stable_identifier() {
    let tmp = project();
    let first = shellvault()
        .args(["id", "example"])
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert!(first.status.success());
    let id = String::from_utf8(first.stdout).unwrap();
    assert_eq!(id.trim().len(), 13);

    shellvault()
        .args(["id", "example", "--length", "12"])
        .current_dir(tmp.path())
        .assert()
        .success()
        .stdout(id);
}

#[test]
fn id_rejects_out_of_range_length() {
    let tmp = project();
    shellvault()
        .args(["id", "example", "--length", "1"])
        .current_dir(tmp.path())
        .assert()
        .failure();
}

#[test]
fn completions_generate_for_bash() {
    shellvault()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shellvault"))
        .stdout(predicate::str::contains("logout"));
}

#[test]
fn completions_reject_unknown_shell() {
    shellvault()
        .args(["completions", "csh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'csh'"))
        .stderr(predicate::str::contains("bash"));
}

#[test]
fn vault_dir_flag_overrides_config() {
    let tmp = project();
    shellvault()
        .args(["init", "--vault-dir", "custom-vault"])
        .current_dir(tmp.path())
        .env("SHELLVAULT_PASSWORD", PASSWORD)
        .assert()
        .success();

    tmp.child("custom-vault/keys.toml").assert(predicate::path::exists());
    tmp.child(".shellvault").assert(predicate::path::missing());
}
