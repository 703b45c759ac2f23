#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn notices(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("notices").unwrap();
    cmd.current_dir(dir.path())
        .env("NOTICES_CONFIG", dir.path().join("notices.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn init_sample(dir: &TempDir) {
    notices(dir).args(["init", "--sample"]).assert().success();
}

fn output_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path().join("print_server"))
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .map(|e| e.path().extension().is_some_and(|x| x == "docx"))
                .unwrap_or(false)
        })
        .count()
}

// ---------------------------------------------------------------------------
// notices init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_project() {
    let dir = TempDir::new().unwrap();
    notices(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: notices.yaml"));

    assert!(dir.path().join("notices.yaml").exists());
    assert!(dir.path().join("residents.xlsx").exists());
    assert!(dir.path().join("templates/template1.docx").exists());
    assert!(dir.path().join("templates/template3a.docx").exists());
    assert!(dir.path().join("print_server").is_dir());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir)
        .args(["init", "--sample"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  notices.yaml"))
        .stdout(predicate::str::contains("created:").not());
}

// ---------------------------------------------------------------------------
// notices config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_accepts_sample() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir).args(["config", "validate"]).assert().success();
}

#[test]
fn config_validate_rejects_header_row_zero() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    let path = dir.path().join("notices.yaml");
    let yaml = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, yaml.replace("header_row: 1", "header_row: 0")).unwrap();

    notices(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_show_json() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sheet\": \"TRACKER\""));
}

#[test]
fn missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    notices(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config not found"));
}

// ---------------------------------------------------------------------------
// notices sheets / plan / run
// ---------------------------------------------------------------------------

#[test]
fn sheets_lists_configured_sheet() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir)
        .arg("sheets")
        .assert()
        .success()
        .stdout(predicate::str::contains("* \"TRACKER\""));
}

#[test]
fn plan_shows_next_letter_per_row() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("TEMPLATE"))
        .stdout(predicate::str::contains("14 Oak Street, Leeds, LS6 2AB"))
        .stdout(predicate::str::contains("letter 2"))
        .stdout(predicate::str::contains("template3"));

    assert_eq!(output_files(&dir), 0);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    let before = std::fs::read(dir.path().join("residents.xlsx")).unwrap();

    notices(&dir)
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planned: 3"));

    assert_eq!(output_files(&dir), 0);
    assert_eq!(std::fs::read(dir.path().join("residents.xlsx")).unwrap(), before);
}

#[test]
fn run_generates_then_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);

    notices(&dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("generated: 3"));
    assert_eq!(output_files(&dir), 3);
    assert!(dir
        .path()
        .join("print_server/WO-1001_14_Oak_Street_Leeds.docx")
        .exists());

    // every row was just stamped, so nothing is due yet
    notices(&dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("generated: 0"));
    assert_eq!(output_files(&dir), 3);
}

#[test]
fn run_json_reports_rows() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    let out = notices(&dir)
        .args(["--json", "run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["generated"], 3);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["rows"].as_array().unwrap().len(), 3);
}

#[test]
fn run_fails_when_template_missing() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    std::fs::remove_file(dir.path().join("templates/template1.docx")).unwrap();

    notices(&dir)
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("generated: 2"))
        .stderr(predicate::str::contains("1 row(s) failed"));
}

#[test]
fn watch_once_runs_a_single_cycle() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    notices(&dir)
        .args(["watch", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("generated: 3"));
}

#[test]
fn watch_once_fails_like_run_when_a_row_fails() {
    let dir = TempDir::new().unwrap();
    init_sample(&dir);
    std::fs::remove_file(dir.path().join("templates/template1.docx")).unwrap();

    notices(&dir)
        .args(["watch", "--once"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed: 1"))
        .stderr(predicate::str::contains("1 row(s) failed"));
}
