use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mdi_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mdi"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let runs_dir = root.join("runs");
    fs::create_dir_all(&runs_dir).unwrap();
    fs::write(
        runs_dir.join("alpha.json"),
        r#"{"archived_path": "/beamline/2024/alpha", "PI": "Ada Lovelace"}"#,
    )
    .unwrap();
    fs::write(
        runs_dir.join("beta.json"),
        r#"{"archivedPath": "/beamline/2024/beta", "PI": "Grace Hopper"}"#,
    )
    .unwrap();
    fs::write(
        runs_dir.join("gamma.json"),
        r#"{"PI": "Rosalind Franklin", "archiveFolderPath": "/beamline/2024/gamma"}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[store.test]
backend = "sqlite"
address = "{}/data"
port = 27017
username = "curator"
auth_source = "admin"
database = "metadata"
collection = "runs"
index_keys = ["archived_path"]

[secrets]
filename = "secrets.toml"
"#,
        root.display()
    );
    let config_path = config_dir.join("ingester.toml");
    fs::write(&config_path, config_content).unwrap();
    fs::write(
        config_dir.join("secrets.toml"),
        "[store.test]\npassword = \"hunter2\"\n",
    )
    .unwrap();

    (tmp, config_path)
}

fn run_mdi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mdi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .arg("--mode")
        .arg("test")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mdi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn runs_dir(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("runs")
        .display()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mdi(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("collection 'runs' ready"));
    assert!(tmp.path().join("data/metadata.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_mdi(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_mdi(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_check_config_redacts_password() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mdi(&config_path, &["check-config"]);
    assert!(success, "check-config failed: stderr={}", stderr);
    assert!(stdout.contains("collection:  runs"));
    assert!(stdout.contains("index keys:  archived_path"));
    assert!(!stdout.contains("hunter2"));
    assert!(!stderr.contains("hunter2"));
}

#[test]
fn test_check_config_unknown_mode_section() {
    let (_tmp, config_path) = setup_test_env();

    let output = Command::new(mdi_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["--mode", "prod", "check-config"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no [store.prod] section"), "stderr={}", stderr);
}

#[test]
fn test_ingest_directory() {
    let (_tmp, config_path) = setup_test_env();
    let runs = runs_dir(&config_path);

    let (stdout, stderr, success) = run_mdi(&config_path, &["ingest", &runs]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reingest_skips_duplicates() {
    let (_tmp, config_path) = setup_test_env();
    let runs = runs_dir(&config_path);

    let (stdout1, _, success1) = run_mdi(&config_path, &["ingest", &runs]);
    assert!(success1);
    assert!(stdout1.contains("ingested: 3"));

    let (stdout2, stderr2, success2) = run_mdi(&config_path, &["ingest", &runs]);
    assert!(success2, "duplicates must not fail the run: stderr={}", stderr2);
    assert!(stdout2.contains("ingested: 0"));
    assert!(stdout2.contains("duplicates skipped: 3"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    let runs = runs_dir(&config_path);

    let (stdout, _, success) = run_mdi(&config_path, &["ingest", "--dry-run", &runs]);
    assert!(success);
    assert!(stdout.contains("ingest (dry-run)"));
    assert!(stdout.contains("ingested: 3"));
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn test_ingest_reports_failures_and_exits_nonzero() {
    let (tmp, config_path) = setup_test_env();
    let runs = tmp.path().join("runs");
    fs::write(runs.join("orphan.json"), r#"{"title": "no path here"}"#).unwrap();
    fs::write(runs.join("broken.json"), r#"{"archived_path": "#).unwrap();

    let (stdout, stderr, success) =
        run_mdi(&config_path, &["ingest", runs.to_str().unwrap()]);
    assert!(!success, "ingest should fail when documents fail");
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("failed: 2"));
    assert!(stdout.contains("[load]"));
    assert!(stdout.contains("[normalize]"));
    assert!(stderr.contains("2 document(s) failed"));
}

#[test]
fn test_ingest_with_schema_gate() {
    let (tmp, config_path) = setup_test_env();
    let runs = tmp.path().join("runs");
    fs::write(runs.join("delta.json"), r#"{"archived_path": "/beamline/2024/delta"}"#).unwrap();
    let schema = tmp.path().join("gt-schema.json");
    fs::write(
        &schema,
        r#"{"type": "object", "required": ["PI"], "properties": {"PI": {"type": "string"}}}"#,
    )
    .unwrap();

    let (stdout, _, success) = run_mdi(
        &config_path,
        &[
            "ingest",
            "--schema",
            schema.to_str().unwrap(),
            runs.to_str().unwrap(),
        ],
    );
    assert!(!success);
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("failed: 1"));
    assert!(stdout.contains("[validate]"));
    assert!(stdout.contains("delta.json"));
}

#[test]
fn test_malformed_schema_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    let schema = tmp.path().join("bad-schema.json");
    fs::write(&schema, r#"{"type": "object", "required": "#).unwrap();
    let runs = runs_dir(&config_path);

    let (_, stderr, success) = run_mdi(
        &config_path,
        &["ingest", "--schema", schema.to_str().unwrap(), &runs],
    );
    assert!(!success);
    assert!(stderr.contains("cannot load schema"), "stderr={}", stderr);
}

#[test]
fn test_validate_without_store() {
    let tmp = TempDir::new().unwrap();
    let schema = tmp.path().join("schema.json");
    fs::write(&schema, r#"{"type": "object", "required": ["PI"]}"#).unwrap();
    let good = tmp.path().join("good.json");
    fs::write(&good, r#"{"PI": "Ada"}"#).unwrap();
    let bad = tmp.path().join("bad.json");
    fs::write(&bad, r#"{"archived_path": "/x"}"#).unwrap();

    let output = Command::new(mdi_binary())
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg(&good)
        .arg(&bad)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("validated 2 document(s), 1 failed"));
    assert!(stdout.contains("FAIL"));
}

#[test]
fn test_missing_path_errors() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nowhere");

    let (_, stderr, success) = run_mdi(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("No such file or directory"));
}

#[test]
fn test_secrets_flag_overrides_config() {
    let (tmp, config_path) = setup_test_env();
    let vault = tmp.path().join("vault.toml");
    fs::write(&vault, "[store.test]\npassword = \"from-vault\"\n").unwrap();
    fs::remove_file(tmp.path().join("config/secrets.toml")).unwrap();

    let (_, stderr, success) = run_mdi(&config_path, &["check-config"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"), "stderr={}", stderr);

    let (stdout, stderr, success) = run_mdi(
        &config_path,
        &["--secrets", vault.to_str().unwrap(), "check-config"],
    );
    assert!(success, "check-config failed: stderr={}", stderr);
    assert!(stdout.contains("ok"));
    assert!(!stdout.contains("from-vault"));
}
