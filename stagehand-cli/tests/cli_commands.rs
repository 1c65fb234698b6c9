use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

/// `runtime.program` stands in for docker: `true` accepts anything, `false`
/// fails every delegated command.
fn write_project(root: &Path, program: &str) {
    let config = format!(
        "project: shop\n\
         runtime:\n  program: {program}\n\
         default_service: api\n\
         services:\n\
         \x20 - name: api\n\
         \x20   source: src/api\n\
         \x20   build: build/api\n\
         \x20 - name: web\n\
         \x20   source: src/web\n\
         \x20   build: build/web\n\
         \x20   restart: frontend\n"
    );
    fs::write(root.join("stagehand.yaml"), config).expect("config");
    for service in ["api", "web"] {
        let dir = root.join("src").join(service);
        fs::create_dir_all(dir.join("__pycache__")).expect("source");
        fs::write(dir.join("main.py"), format!("print('{service}')\n")).expect("file");
        fs::write(dir.join("__pycache__/main.pyc"), "compiled").expect("cache");
    }
}

fn stagehand(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stagehand"));
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .env_remove("STAGEHAND_CONFIG")
        .env_remove("STAGEHAND_LOG");
    cmd
}

fn build_path(root: &Path, service: &str) -> PathBuf {
    root.join("build").join(service)
}

#[test]
fn sync_mirrors_and_restarts_the_downstream_service() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");

    stagehand(tmp.path())
        .args(["sync", "web"])
        .assert()
        .success()
        .stdout(contains("'web' synced (1 copied, 0 deleted)"))
        .stdout(contains("restarted 'frontend'"));

    let build = build_path(tmp.path(), "web");
    assert_eq!(fs::read_to_string(build.join("main.py")).unwrap(), "print('web')\n");
    assert!(!build.join("__pycache__").exists(), "excluded paths are never copied");

    stagehand(tmp.path())
        .args(["sync", "web"])
        .assert()
        .success()
        .stdout(contains("'web' already in sync"));
}

#[test]
fn sync_without_a_name_uses_the_default_service() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");

    stagehand(tmp.path()).arg("sync").assert().success();
    assert!(build_path(tmp.path(), "api").join("main.py").exists());
    assert!(!build_path(tmp.path(), "web").exists());
}

#[test]
fn missing_source_exits_non_zero() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");
    fs::remove_dir_all(tmp.path().join("src/api")).unwrap();

    stagehand(tmp.path())
        .args(["sync", "api"])
        .assert()
        .failure()
        .stderr(contains("source tree unavailable"));
    assert!(!build_path(tmp.path(), "api").exists());
}

#[test]
fn dry_run_reports_without_writing() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "false");

    // `false` would fail any restart; a dry run must not attempt one.
    stagehand(tmp.path())
        .args(["sync", "api", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("main.py"));
    assert!(!build_path(tmp.path(), "api").exists());
}

#[test]
fn failed_restart_exits_non_zero_after_syncing() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "false");

    stagehand(tmp.path())
        .args(["sync", "api"])
        .assert()
        .failure()
        .stderr(contains("restart of api failed"));
    assert!(build_path(tmp.path(), "api").join("main.py").exists());
}

#[test]
fn no_restart_skips_delegation() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "false");

    stagehand(tmp.path())
        .args(["sync", "api", "--no-restart"])
        .assert()
        .success();
}

#[test]
fn unknown_service_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");

    stagehand(tmp.path())
        .args(["sync", "db"])
        .assert()
        .failure()
        .stderr(contains("unknown service 'db'"));
}

#[test]
fn up_syncs_every_service_then_delegates() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");

    stagehand(tmp.path())
        .arg("up")
        .assert()
        .success()
        .stdout(contains("'api' synced"))
        .stdout(contains("'web' synced"))
        .stdout(contains("topology is up"));
}

#[test]
fn up_aborts_when_a_source_is_missing() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");
    fs::remove_dir_all(tmp.path().join("src/web")).unwrap();

    stagehand(tmp.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(contains("up failed"));
}

#[test]
fn down_propagates_a_failing_runtime() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "false");

    stagehand(tmp.path())
        .arg("down")
        .assert()
        .failure()
        .stderr(contains("down failed"));
}

#[test]
fn status_json_reports_pending_and_last_sync() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");

    stagehand(tmp.path()).args(["sync", "api"]).assert().success();
    fs::remove_dir_all(tmp.path().join("src/web")).unwrap();

    let output = stagehand(tmp.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());

    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status JSON");
    assert_eq!(payload["project"], "shop");
    let services = payload["services"].as_array().expect("services");
    assert_eq!(services.len(), 2);

    assert_eq!(services[0]["service"], "api");
    assert_eq!(services[0]["outcome"], "ok");
    assert_eq!(services[0]["pending_changes"], 0);

    assert_eq!(services[1]["service"], "web");
    assert!(services[1]["outcome"].is_null());
    assert!(services[1]["pending_changes"].is_null());
    assert_eq!(services[1]["last_sync_age"], "never");
}

#[test]
fn diff_shows_pending_edits_and_writes_nothing() {
    let tmp = TempDir::new().expect("tmp");
    write_project(tmp.path(), "true");
    stagehand(tmp.path()).args(["sync", "api"]).assert().success();

    fs::write(tmp.path().join("src/api/main.py"), "print('v2')\n").unwrap();
    stagehand(tmp.path())
        .args(["diff", "api"])
        .assert()
        .success()
        .stdout(contains("-print('api')"))
        .stdout(contains("+print('v2')"));
    assert_eq!(
        fs::read_to_string(build_path(tmp.path(), "api").join("main.py")).unwrap(),
        "print('api')\n"
    );

    fs::write(tmp.path().join("src/api/main.py"), "print('api')\n").unwrap();
    stagehand(tmp.path())
        .args(["diff", "api"])
        .assert()
        .success()
        .stdout(contains("No differences for 'api'."));
}

#[test]
fn explicit_config_works_from_another_directory() {
    let tmp = TempDir::new().expect("tmp");
    let elsewhere = TempDir::new().expect("elsewhere");
    write_project(tmp.path(), "true");

    stagehand(elsewhere.path())
        .args(["sync", "api", "--config"])
        .arg(tmp.path().join("stagehand.yaml"))
        .assert()
        .success();
    assert!(build_path(tmp.path(), "api").join("main.py").exists());
}

#[test]
fn missing_config_points_at_init() {
    let tmp = TempDir::new().expect("tmp");

    stagehand(tmp.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("stagehand init"));
}

#[test]
fn init_scaffolds_once() {
    let tmp = TempDir::new().expect("tmp");
    let project = tmp.path().join("storefront");
    fs::create_dir_all(&project).unwrap();

    stagehand(&project)
        .args(["init", "--service", "api"])
        .assert()
        .success()
        .stdout(contains("created"));
    let written = fs::read_to_string(project.join("stagehand.yaml")).unwrap();
    assert!(written.contains("project: storefront"));
    assert!(written.contains("name: api"));

    stagehand(&project)
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already exists"));
}
