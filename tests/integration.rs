use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("alpha.txt"),
        "Alpha document about the warehouse.\n\nThe warehouse opens at nine.",
    )
    .unwrap();
    fs::write(
        data_dir.join("beta.csv"),
        "team,lead\nplatform,Ada\nsearch,Grace\n",
    )
    .unwrap();
    fs::write(data_dir.join("ignored.md"), "# Not scanned").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/state/catalog.sqlite"

[sync]
root = "{root}/data"

[index]
backend = "sqlite"
path = "{root}/state/index.sqlite"

[embedding]
provider = "hashing"
dims = 256
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ragsync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_ragsync");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn data_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("data")
}

#[test]
fn test_init_creates_catalog() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragsync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let state = config_path.parent().unwrap().parent().unwrap().join("state");
    assert!(state.join("catalog.sqlite").exists());
    assert!(state.join("index.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ragsync(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ragsync(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_adds_supported_files() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragsync(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("added:    2"), "{}", stdout);
    assert!(stdout.contains("chunks indexed: 3"), "{}", stdout);
}

#[test]
fn test_sync_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    run_ragsync(&config_path, &["sync"]);
    let (stdout, _, success) = run_ragsync(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("up to date"), "{}", stdout);
}

#[test]
fn test_sync_incremental() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["sync"]);

    let data = data_dir(&config_path);
    fs::write(data.join("alpha.txt"), "Alpha rewritten.").unwrap();
    fs::remove_file(data.join("beta.csv")).unwrap();
    fs::write(data.join("gamma.txt"), "Gamma is new.").unwrap();

    let (stdout, stderr, success) = run_ragsync(&config_path, &["sync"]);
    assert!(success, "sync failed: stderr={}", stderr);
    assert!(stdout.contains("added:    1"), "{}", stdout);
    assert!(stdout.contains("modified: 1"), "{}", stdout);
    assert!(stdout.contains("deleted:  1"), "{}", stdout);
}

#[test]
fn test_sync_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragsync(&config_path, &["sync", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry run"));
    assert!(stdout.contains("+ alpha.txt"));
    assert!(stdout.contains("+ beta.csv"));
    assert!(!stdout.contains("ignored.md"));

    // Nothing was recorded, so a real sync still sees both files as new.
    let (stdout, _, _) = run_ragsync(&config_path, &["sync"]);
    assert!(stdout.contains("added:    2"), "{}", stdout);
}

#[test]
fn test_sync_explicit_directory() {
    let (tmp, config_path) = setup_test_env();
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("solo.txt"), "Only file here.").unwrap();

    let (stdout, stderr, success) =
        run_ragsync(&config_path, &["sync", other.to_str().unwrap()]);
    assert!(success, "sync failed: stderr={}", stderr);
    assert!(stdout.contains("added:    1"), "{}", stdout);
}

#[test]
fn test_status_lists_files() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["sync"]);

    let (stdout, stderr, success) = run_ragsync(&config_path, &["status"]);
    assert!(success, "status failed: stderr={}", stderr);
    assert!(stdout.contains("Files:     2"), "{}", stdout);
    assert!(stdout.contains("Chunks:    3"), "{}", stdout);
    assert!(stdout.contains("alpha.txt"));
    assert!(stdout.contains("committed"));
}

#[test]
fn test_search_finds_synced_text() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["sync"]);

    let (stdout, stderr, success) =
        run_ragsync(&config_path, &["search", "warehouse opens", "-k", "1"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.starts_with("1. ["), "{}", stdout);
    assert!(stdout.contains("alpha.txt"), "{}", stdout);
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["init"]);

    let (stdout, _, success) = run_ragsync(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_forget_then_resync() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["sync"]);

    let (stdout, _, success) = run_ragsync(&config_path, &["forget", "beta.csv"]);
    assert!(success);
    assert!(stdout.contains("forgot beta.csv (2 chunks removed)"), "{}", stdout);

    let (stdout, _, _) = run_ragsync(&config_path, &["forget", "beta.csv"]);
    assert!(stdout.contains("not indexed"), "{}", stdout);

    let (stdout, _, _) = run_ragsync(&config_path, &["sync"]);
    assert!(stdout.contains("added:    1"), "{}", stdout);
}

#[test]
fn test_ingest_unsupported_extension_directly() {
    let (_tmp, config_path) = setup_test_env();
    let md = data_dir(&config_path).join("ignored.md");

    let (stdout, stderr, success) = run_ragsync(
        &config_path,
        &["ingest", md.to_str().unwrap(), "--source-id", "ignored.md"],
    );
    assert!(success, "ingest failed: stderr={}", stderr);
    assert!(stdout.contains("1 chunks"), "{}", stdout);

    // Direct ingestion bypasses the catalog.
    let (stdout, _, _) = run_ragsync(&config_path, &["status"]);
    assert!(stdout.contains("Files:     0"), "{}", stdout);
    assert!(stdout.contains("Chunks:    1"), "{}", stdout);
}

#[test]
fn test_ask_without_chat_provider_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_ragsync(&config_path, &["sync"]);

    let (_, stderr, success) = run_ragsync(&config_path, &["ask", "When does it open?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "{}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();

    let (_, stderr, success) = run_ragsync(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "{}", stderr);
}
