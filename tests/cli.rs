// Integration tests for `qledger reconcile`.
// Run with: cargo test --test cli

use std::fs;
use std::process::Command;

use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn qledger() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qledger"));
    // Keep the caller's environment from steering the run.
    cmd.env_remove("QLEDGER_REGISTRY_URL");
    cmd.env_remove("QLEDGER_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn reconcile_merges_results_and_prints_summary() {
    let server = MockServer::start();
    let list_mock = server.mock(|when, then| {
        when.method(GET).path("/queries");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"queries": [
                {"id": "Q2", "status": "running"},
                {"id": "Q3", "status": "completed"}
            ]}));
    });
    let result_mock = server.mock(|when, then| {
        when.method(GET).path("/queries/Q3/results");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!([{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}, {"n": 5}]));
    });

    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    fs::write(
        &ledger,
        "query_id,status,result_size\nQ1,pending,\nQ2,pending,\nQ3,pending,\nQ4,completed,2\n",
    )
    .expect("ledger written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .args(["--registry-url", &server.base_url()])
        .output()
        .expect("failed to run qledger");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    list_mock.assert_calls(1);
    result_mock.assert_calls(1);

    assert_eq!(
        fs::read_to_string(&ledger).unwrap(),
        "query_id,status,result_size\nQ1,pending,\nQ2,pending,\nQ3,completed,5\nQ4,completed,2\n"
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("total              4"), "stdout: {stdout}");
    assert!(stdout.contains("newly completed    1"), "stdout: {stdout}");
    assert!(stdout.contains("expired            1"), "stdout: {stdout}");
    assert!(stdout.contains("still pending      1"), "stdout: {stdout}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no longer tracked"), "stderr: {stderr}");
}

#[test]
fn json_report_lists_outcomes() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/queries");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!([]));
    });

    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    fs::write(&ledger, "id,state,rows\nQ1,pending,\n").expect("ledger written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .args(["--registry-url", &server.base_url()])
        .args(["--id-column", "id", "--status-column", "state", "--size-column", "rows"])
        .args(["--persist", "end-of-run", "--json"])
        .output()
        .expect("failed to run qledger");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(report["summary"]["expired"], 1);
    assert_eq!(report["outcomes"][0]["query_id"], "Q1");
}

#[test]
fn missing_column_exits_1_without_calling_registry() {
    let server = MockServer::start();
    let list_mock = server.mock(|when, then| {
        when.method(GET).path("/queries");
        then.status(200).json_body(json!([]));
    });

    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    let source = "query_id,result_size\nQ1,\n";
    fs::write(&ledger, source).expect("ledger written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .args(["--registry-url", &server.base_url()])
        .output()
        .expect("failed to run qledger");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("missing required column 'status'"),
        "stderr: {stderr}"
    );
    list_mock.assert_calls(0);
    assert_eq!(fs::read_to_string(&ledger).unwrap(), source);
}

#[test]
fn missing_ledger_exits_1() {
    let temp_dir = tempdir().expect("temporary directory");
    let output = qledger()
        .arg("reconcile")
        .arg(temp_dir.path().join("absent.csv"))
        .args(["--registry-url", "http://127.0.0.1:9"])
        .output()
        .expect("failed to run qledger");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input file not found"), "stderr: {stderr}");
}

#[test]
fn registry_url_can_come_from_config_file() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/queries");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!([{"id": "Q1", "status": "queued"}]));
    });

    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    fs::write(&ledger, "query_id,status,result_size\nQ1,pending,\n").expect("ledger written");
    let config = temp_dir.path().join("qledger.toml");
    fs::write(
        &config,
        format!("[registry]\nurl = \"{}\"\n", server.base_url()),
    )
    .expect("config written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run qledger");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("still pending      1"), "stdout: {stdout}");
}

#[test]
fn completed_ledger_needs_no_registry_url() {
    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    let source = "query_id,status,result_size\nQ1,completed,4\n";
    fs::write(&ledger, source).expect("ledger written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .output()
        .expect("failed to run qledger");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("already completed  1"), "stdout: {stdout}");
    assert_eq!(fs::read_to_string(&ledger).unwrap(), source);
}

#[test]
fn pending_ledger_without_registry_url_exits_1() {
    let temp_dir = tempdir().expect("temporary directory");
    let ledger = temp_dir.path().join("ledger.csv");
    let source = "query_id,status,result_size\nQ1,pending,\n";
    fs::write(&ledger, source).expect("ledger written");

    let output = qledger()
        .arg("reconcile")
        .arg(&ledger)
        .output()
        .expect("failed to run qledger");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("registry url is not set"), "stderr: {stderr}");
    assert_eq!(fs::read_to_string(&ledger).unwrap(), source);
}
