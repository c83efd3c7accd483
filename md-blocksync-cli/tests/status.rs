use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn project_with_mapping(dir: &std::path::Path, hash: &str) {
    fs::create_dir_all(dir.join("docs")).unwrap();
    fs::write(dir.join("docs").join("a.md"), "# A\n").unwrap();
    let state = serde_json::json!({
        "version": 1,
        "mappings": [{
            "local_path": "docs/a.md",
            "remote_document_id": "doc1",
            "local_hash_at_sync": hash,
            "remote_revision_at_sync": 3
        }]
    });
    fs::write(
        dir.join(".lark-sync.json"),
        serde_json::to_string_pretty(&state).unwrap(),
    )
    .unwrap();
}

fn hash_of(content: &str) -> String {
    md_blocksync::sync::content_hash(content)
}

#[test]
#[allow(deprecated)]
fn test_status_clean_project() {
    let dir = tempdir().unwrap();
    project_with_mapping(dir.path(), &hash_of("# A\n"));

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("status").current_dir(dir.path());

    cmd.assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("All files in sync."));
}

#[test]
#[allow(deprecated)]
fn test_status_reports_local_edits_and_untracked() {
    let dir = tempdir().unwrap();
    project_with_mapping(dir.path(), &hash_of("# Old\n"));
    fs::write(dir.path().join("notes.md"), "new").unwrap();

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("status").current_dir(dir.path());

    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("local_ahead: docs/a.md"))
        .stdout(predicate::str::contains("untracked: notes.md"));
}

#[test]
#[allow(deprecated)]
fn test_status_json_output() {
    let dir = tempdir().unwrap();
    project_with_mapping(dir.path(), &hash_of("# A\n"));
    fs::remove_file(dir.path().join("docs").join("a.md")).unwrap();

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("status").arg("--json").current_dir(dir.path());

    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = json.get("files").unwrap();
    assert!(files.is_array());
    let file = files.get(0).unwrap();
    assert_eq!(file.get("path").unwrap(), "docs/a.md");
    assert_eq!(file.get("status").unwrap(), "missing");
}

#[test]
#[allow(deprecated)]
fn test_status_uses_global_state_outside_projects() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("a.md");
    fs::write(&doc, "text\n").unwrap();
    let state = serde_json::json!({
        "mappings": [{
            "local_path": doc.to_string_lossy(),
            "lark_document_id": "doc1",
            "local_hash_at_sync": hash_of("text\n")
        }]
    });
    let state_file = dir.path().join("global.json");
    fs::write(&state_file, state.to_string()).unwrap();

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("status")
        .env("LARK_SYNC_STATE_FILE", &state_file)
        .current_dir(dir.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("All files in sync."));
}

#[test]
#[allow(deprecated)]
fn test_init_requires_git_root() {
    let dir = tempdir().unwrap();

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("init")
        .arg("--state-file")
        .arg(dir.path().join("global.json"))
        .current_dir(dir.path());

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No Git repository found"));
}

#[test]
#[allow(deprecated)]
fn test_init_creates_project_state() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::create_dir_all(dir.path().join("docs")).unwrap();

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("init")
        .arg("docs")
        .arg("--state-file")
        .arg(dir.path().join("global.json"))
        .current_dir(dir.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0 mapping(s) migrated"));
    assert!(dir.path().join(".lark-sync.json").exists());

    let mut cmd = Command::cargo_bin("md-blocksync").unwrap();
    cmd.arg("init")
        .arg("--state-file")
        .arg(dir.path().join("global.json"))
        .current_dir(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}
