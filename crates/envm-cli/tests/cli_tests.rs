//! Integration tests for the `envm` CLI binary.
//!
//! These run the binary as a subprocess with `HOME` pointed at a temporary
//! directory and the API URL at a port nothing listens on, so only local
//! behavior (argument parsing, vault handling, `envm.json` checks) is
//! exercised.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn envm_bin() -> String {
    let path = env!("CARGO_BIN_EXE_envm");
    assert!(Path::new(path).exists(), "envm binary not found at {path}");
    path.to_owned()
}

/// Run envm with `home` as HOME and `cwd` as working directory.
fn run_in(home: &Path, cwd: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(envm_bin())
        .args(args)
        .current_dir(cwd)
        .env("HOME", home)
        .env("ENVM_API_URL", "http://127.0.0.1:19999")
        .env_remove("ENVM_PASSWORD")
        .output()
        .expect("failed to execute envm");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn run(home: &TempDir, args: &[&str]) -> (i32, String, String) {
    run_in(home.path(), home.path(), args)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run(&home, &["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("envm"), "version output: {stdout}");
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run(&home, &["--help"]);
    assert_eq!(code, 0);
    for command in [
        "login", "logout", "whoami", "init", "load", "pull", "push", "users", "orgs", "projects",
        "envs",
    ] {
        assert!(stdout.contains(command), "help should list '{command}': {stdout}");
    }
}

#[test]
fn test_subcommand_help() {
    let home = TempDir::new().unwrap();
    for sub in ["orgs", "projects", "envs", "users", "load", "login", "reset-password"] {
        let (code, stdout, _) = run(&home, &[sub, "--help"]);
        assert_eq!(code, 0, "{sub} --help should exit 0");
        assert!(!stdout.is_empty());
    }
}

// ── Vault handling ───────────────────────────────────────────────────

#[test]
fn test_whoami_without_session() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run(&home, &["whoami"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not logged in"), "stderr: {stderr}");
}

#[test]
fn test_corrupted_vault_is_reported() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".envm");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("credentials"), "this is not hex").unwrap();

    let (code, _, stderr) = run(&home, &["whoami"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("corrupted"), "stderr: {stderr}");
}

#[test]
fn test_foreign_vault_is_a_machine_mismatch() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".envm");
    fs::create_dir_all(&dir).unwrap();
    // Valid hex, but not sealed under this machine's key.
    fs::write(dir.join("credentials"), "00".repeat(64)).unwrap();

    let (code, _, stderr) = run(&home, &["whoami"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("machine identity mismatch"), "stderr: {stderr}");
}

#[test]
fn test_logout_without_session_succeeds() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run(&home, &["logout"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Already logged out"), "stdout: {stdout}");
}

#[test]
fn test_logout_removes_unreadable_vault() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".envm");
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("credentials");
    fs::write(&file, "garbage").unwrap();

    let (code, _, _) = run(&home, &["logout"]);
    assert_eq!(code, 0);
    assert!(!file.exists());
}

// ── Directory commands ───────────────────────────────────────────────

#[test]
fn test_push_requires_envm_json() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join(".env"), "A=1\n").unwrap();

    let (code, _, stderr) = run_in(home.path(), project.path(), &["push"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("envm.json"), "stderr: {stderr}");
}

#[test]
fn test_pull_requires_session() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(
        project.path().join("envm.json"),
        r#"{"organization_id":"o","project_id":"p","environments":[]}"#,
    )
    .unwrap();

    let (code, _, stderr) = run_in(home.path(), project.path(), &["pull"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not logged in"), "stderr: {stderr}");
}

#[test]
fn test_init_refuses_to_overwrite() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("envm.json"), "{}").unwrap();

    let (code, _, stderr) = run_in(home.path(), project.path(), &["init"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("already exists"), "stderr: {stderr}");
}

#[test]
fn test_singular_aliases_resolve() {
    let home = TempDir::new().unwrap();
    for args in [
        ["org", "update", "--help"],
        ["project", "get", "--help"],
        ["env", "create", "--help"],
    ] {
        let (code, stdout, _) = run(&home, &args);
        assert_eq!(code, 0, "{args:?} should parse");
        assert!(!stdout.is_empty());
    }
}

#[test]
fn test_delete_requires_yes() {
    let home = TempDir::new().unwrap();
    for args in [
        &["org", "delete", "o1"][..],
        &["project", "delete", "p1"][..],
        &["env", "delete", "e1"][..],
        &["users", "delete"][..],
    ] {
        let (code, _, stderr) = run(&home, args);
        assert_ne!(code, 0, "{args:?} should refuse");
        assert!(stderr.contains("--yes"), "stderr: {stderr}");
    }
}

#[test]
fn test_env_list_without_project_requires_envm_json() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run(&home, &["env", "list"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("envm.json"), "stderr: {stderr}");
}

#[test]
fn test_load_without_envm_json_lists_files() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join(".env.staging"), "A=1\n").unwrap();

    let (code, stdout, _) = run_in(home.path(), project.path(), &["load"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(".env.staging"), "stdout: {stdout}");
    assert!(stdout.contains("envm init"), "stdout: {stdout}");
    assert!(!project.path().join("envm.json").exists());
}

#[test]
fn test_load_records_new_files() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(
        project.path().join("envm.json"),
        r#"{"organization_id":"o","project_id":"p","environments":[{"name":"default","path":".env"}]}"#,
    )
    .unwrap();
    fs::write(project.path().join(".env"), "A=1\n").unwrap();
    fs::write(project.path().join(".env.staging"), "B=2\n").unwrap();

    let (code, _, stderr) = run_in(home.path(), project.path(), &["load"]);
    assert_eq!(code, 0, "stderr: {stderr}");

    let config = fs::read_to_string(project.path().join("envm.json")).unwrap();
    assert!(config.contains(".env.staging"), "config: {config}");
    assert_eq!(config.matches("\".env\"").count(), 1, "config: {config}");
}

#[test]
fn test_login_against_unreachable_server_fails() {
    let home = TempDir::new().unwrap();
    let (code, _, stderr) = run(
        &home,
        &["login", "--email", "a@example.com", "--password", "whatever1"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("request failed"), "stderr: {stderr}");
    assert!(!home.path().join(".envm").join("credentials").exists());
}
