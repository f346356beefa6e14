use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn eml(subject: &str, body: &str) -> String {
    format!(
        "From: Alice Example <alice@example.com>\r\n\
To: me@example.com\r\n\
Subject: {}\r\n\
Date: Wed, 01 May 2024 10:00:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
{}\r\n",
        subject, body
    )
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let mail_dir = root.join("mail");
    fs::create_dir_all(mail_dir.join("archive")).unwrap();
    fs::write(
        mail_dir.join("a.eml"),
        eml("Quarterly numbers", "The quarterly revenue grew by fifteen percent."),
    )
    .unwrap();
    fs::write(
        mail_dir.join("b.eml"),
        eml("Lunch", "Pizza lunch on Friday in the kitchen."),
    )
    .unwrap();
    fs::write(
        mail_dir.join("archive/c.eml"),
        eml("Offsite", "The team offsite is planned for the mountains."),
    )
    .unwrap();
    fs::write(
        mail_dir.join("d.eml"),
        eml("Signature only", "--\r\nBob\r\nbob@example.com"),
    )
    .unwrap();

    let config_content = format!(
        r#"[mailbox]
kind = "eml_dir"
root = "{root}/mail"

[embedding]
provider = "hash"
dims = 128

[index]
backend = "sqlite"

[db]
path = "{root}/data/mailsift.sqlite"

[retrieval]
default_top_k = 3
"#,
        root = root.display()
    );

    let config_path = config_dir.join("mailsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mailsift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_mailsift");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mailsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mailsift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/mailsift.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_mailsift(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_mailsift(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_probe_counts_messages() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mailsift(&config_path, &["probe"]);
    assert!(success, "probe failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("mailbox: ok (eml_dir)"));
    assert!(stdout.contains("messages: 4"));
}

#[test]
fn test_sync_indexes_all_messages() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mailsift(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("messages indexed: 4"), "stdout={}", stdout);
    // The signature-only message has no text left after cleaning.
    assert!(stdout.contains("chunks written: 3"), "stdout={}", stdout);
    assert!(stdout.contains("synced: 4 / 4"), "stdout={}", stdout);
}

#[test]
fn test_sync_is_incremental_across_runs() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) =
        run_mailsift(&config_path, &["sync", "--batch-size", "1", "--max-batches", "1"]);
    assert!(success);
    assert!(stdout.contains("messages indexed: 1"), "stdout={}", stdout);

    let (stdout, _, success) = run_mailsift(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("messages indexed: 3"), "stdout={}", stdout);

    fs::write(
        tmp.path().join("mail/e.eml"),
        eml("New", "A brand new message arrived."),
    )
    .unwrap();
    let (stdout, _, success) = run_mailsift(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("messages indexed: 1"), "stdout={}", stdout);

    let (stdout, _, success) = run_mailsift(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("messages indexed: 0"), "stdout={}", stdout);
}

#[test]
fn test_search_before_sync_has_no_results() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mailsift(&config_path, &["search", "revenue"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_finds_best_match_first() {
    let (_tmp, config_path) = setup_test_env();
    run_mailsift(&config_path, &["sync"]);

    let (stdout, stderr, success) =
        run_mailsift(&config_path, &["search", "quarterly revenue", "--limit", "2"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "stdout={}", stdout);
    assert!(first.contains("Quarterly numbers"), "stdout={}", stdout);
    assert!(stdout.contains("message: a.eml (chunk 0)"));
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_mailsift(&config_path, &["search", "  "]);
    assert!(!success, "Empty query should fail");
}

#[test]
fn test_status_after_sync() {
    let (_tmp, config_path) = setup_test_env();
    run_mailsift(&config_path, &["sync"]);

    let (stdout, stderr, success) = run_mailsift(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("mailbox:     reachable"), "stdout={}", stdout);
    assert!(stdout.contains("synced:      4"), "stdout={}", stdout);
    assert!(stdout.contains("chunks:      3"), "stdout={}", stdout);
    assert!(!stdout.contains("last sync:   never"));
}

#[test]
fn test_missing_mail_directory_fails_probe() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_dir_all(tmp.path().join("mail")).unwrap();

    let (_, stderr, success) = run_mailsift(&config_path, &["probe"]);
    assert!(!success);
    assert!(stderr.contains("Mailbox initialization failed"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[mailbox]\nkind = \"eml_dir\"\n").unwrap();

    let (_, stderr, success) = run_mailsift(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("mailbox.root is required"), "stderr={}", stderr);
}
