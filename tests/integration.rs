use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn synx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("synx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let notes_dir = root.join("notes");
    fs::create_dir_all(notes_dir.join("projects")).unwrap();
    fs::create_dir_all(notes_dir.join(".obsidian")).unwrap();
    fs::write(
        notes_dir.join("alpha.md"),
        "# Alpha\n\nKickoff notes for the ingestion rewrite. See [[projects/beta]] for the rollout plan.\n",
    )
    .unwrap();
    fs::write(
        notes_dir.join("projects").join("beta.md"),
        "# Beta\n\nRollout plan: enable the new cursor store per team, then retire the nightly export job.\n",
    )
    .unwrap();
    fs::write(
        notes_dir.join("gamma.txt"),
        "Gamma plain text.\n\nOn-call handbook covering paging, escalation and the weekly incident review.\n",
    )
    .unwrap();
    fs::write(notes_dir.join("empty.md"), "   \n").unwrap();
    fs::write(notes_dir.join(".obsidian").join("workspace.md"), "editor state").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/synx.sqlite"

[engine]
sync_interval_secs = 60
call_timeout_secs = 10

[embedding]
provider = "hash"
dims = 64

[logging]
level = "warn"

[sources.notes.docs]
owner = "alice"
root = "{root}/notes"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("synx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_synx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = synx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run synx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_synx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("synx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_synx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_synx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_notes() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_synx(&config_path, &["sources"]);
    assert!(success, "sources failed: stderr={}", stderr);
    assert!(stdout.contains("notes:docs"));
    assert!(stdout.contains("alice"));
    assert!(stdout.contains("per-item"));
    assert!(stdout.contains("true"));
}

#[test]
fn test_sync_once_indexes_notes() {
    let (_tmp, config_path) = setup_test_env();

    run_synx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_synx(&config_path, &["sync", "notes:docs", "--once"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched:      4"), "stdout={}", stdout);
    assert!(stdout.contains("created:      3"), "stdout={}", stdout);
    assert!(stdout.contains("skipped:      1"), "stdout={}", stdout);
    assert!(stdout.contains("cursor:       saved"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_second_sync_fetches_nothing() {
    let (_tmp, config_path) = setup_test_env();

    run_synx(&config_path, &["init"]);
    let (first, _, _) = run_synx(&config_path, &["sync", "notes:docs", "--once"]);
    assert!(first.contains("created:      3"));

    let (second, stderr, success) = run_synx(&config_path, &["sync", "notes:docs", "--once"]);
    assert!(success, "second sync failed: {}", stderr);
    assert!(second.contains("fetched:      0"), "stdout={}", second);
    assert!(second.contains("created:      0"));
    assert!(second.contains("cursor:       unchanged"));
}

#[test]
fn test_status_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_synx(&config_path, &["init"]);
    run_synx(&config_path, &["sync", "notes:docs", "--once"]);

    let (stdout, stderr, success) = run_synx(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("Graph nodes: 3"), "stdout={}", stdout);
    assert!(stdout.contains("Graph edges: 1"), "stdout={}", stdout);
    assert!(stdout.contains("Vector docs: 3"), "stdout={}", stdout);
    assert!(stdout.contains("Partially indexed: 0"));
    assert!(stdout.contains("notes:docs"));
}

#[test]
fn test_verify_clean_database() {
    let (_tmp, config_path) = setup_test_env();

    run_synx(&config_path, &["init"]);
    run_synx(&config_path, &["sync", "notes:docs", "--once"]);

    let (stdout, stderr, success) = run_synx(&config_path, &["verify"]);
    assert!(success, "verify failed: {}", stderr);
    assert!(stdout.contains("All nodes are present in every configured store."));
}

#[test]
fn test_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_synx(&config_path, &["init"]);
    let (_, stderr, success) = run_synx(&config_path, &["sync", "notes:nonexistent", "--once"]);
    assert!(!success, "sync of unknown source should fail");
    assert!(stderr.contains("Unknown source"));
    assert!(stderr.contains("notes:docs"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, _, success) = run_synx(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
}
