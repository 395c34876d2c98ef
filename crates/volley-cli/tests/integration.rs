#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn volley(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("volley").unwrap();
    cmd.current_dir(dir.path())
        .env("VOLLEY_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    volley(dir).arg("init").assert().success();
}

/// A config that passes validation. Nothing listens on the discard port, and
/// none of the tests below reach the network.
fn write_valid_config(dir: &TempDir) {
    std::fs::write(
        dir.path().join(".volley/config.yaml"),
        "account: test\nserver:\n  endpoint: http://127.0.0.1:9/\n",
    )
    .unwrap();
}

fn write_future_schedule(dir: &TempDir) {
    let input = serde_json::json!([
        {
            "id": "noble-1",
            "source_village": "101",
            "target_coordinates": "500|500",
            "arrival_time": 4_102_444_800i64,
            "troops": { "axe": 100, "snob": 1 },
            "type": "attack"
        },
        {
            "id": "stack-1",
            "source_village": "102",
            "target_coordinates": [501, 499],
            "arrival_time": 4_102_444_800i64,
            "troops": { "spear": 500 },
            "type": "support"
        }
    ]);
    std::fs::write(dir.path().join("future.json"), input.to_string()).unwrap();
}

// ---------------------------------------------------------------------------
// volley init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_directory_tree() {
    let dir = TempDir::new().unwrap();
    volley(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .volley/config.yaml"));

    assert!(dir.path().join(".volley").is_dir());
    assert!(dir.path().join(".volley/cache").is_dir());
    assert!(dir.path().join(".volley/config.yaml").exists());
    assert!(dir.path().join(".volley/map.json").exists());
    assert!(dir.path().join("attacks.json").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(dir.path().join("attacks.json"), "[]").unwrap();

    volley(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  attacks.json"));
    let content = std::fs::read_to_string(dir.path().join("attacks.json")).unwrap();
    assert_eq!(content, "[]");
}

// ---------------------------------------------------------------------------
// volley load / list
// ---------------------------------------------------------------------------

#[test]
fn load_before_init_fails() {
    let dir = TempDir::new().unwrap();
    volley(&dir)
        .arg("load")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn load_example_skips_disabled_entries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let output = volley(&dir).args(["load", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["summary"]["total"], 2);
    assert_eq!(value["summary"]["scheduled"], 0);
    assert_eq!(value["summary"]["skipped"].as_array().unwrap().len(), 2);
    assert_eq!(value["requests"], 0);
}

#[test]
fn load_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    volley(&dir)
        .args(["load", "--file", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn load_groups_requests_by_completion() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_future_schedule(&dir);

    volley(&dir)
        .args(["load", "--file", "future.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 scheduled, 0 skipped"))
        .stdout(predicate::str::contains("2 request(s) in 1 batch(es)"));

    assert!(dir.path().join(".volley/cache/schedule.json").exists());

    // Loading the same file again adds nothing.
    volley(&dir)
        .args(["load", "--file", "future.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new request(s)"));
}

#[test]
fn list_shows_pending_batch() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_future_schedule(&dir);
    volley(&dir)
        .args(["load", "--file", "future.json"])
        .assert()
        .success();

    volley(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2100-01-01 00:00:00"))
        .stdout(predicate::str::contains("noble-1, stack-1"));

    let output = volley(&dir).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let batches: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let batches = batches.as_array().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["completion"], 4_102_444_800i64);
    assert_eq!(batches[0]["expired"], false);
}

#[test]
fn list_estimate_reports_unknown_origin() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_future_schedule(&dir);
    std::fs::write(
        dir.path().join(".volley/map.json"),
        r#"{"villages": {"101": {"x": 490, "y": 490}}}"#,
    )
    .unwrap();
    volley(&dir)
        .args(["load", "--file", "future.json"])
        .assert()
        .success();

    let output = volley(&dir)
        .args(["list", "--estimate", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = value["estimates"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let noble = rows.iter().find(|r| r["id"] == "noble-1").unwrap();
    assert!(noble["travel_secs"].as_u64().unwrap() > 0);
    let stack = rows.iter().find(|r| r["id"] == "stack-1").unwrap();
    assert!(stack["error"].as_str().unwrap().contains("102"));
}

#[test]
fn list_empty_schedule() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    volley(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending batches."));
}

// ---------------------------------------------------------------------------
// volley gate / session
// ---------------------------------------------------------------------------

#[test]
fn gate_status_and_clear() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    volley(&dir)
        .args(["gate", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("open"));

    std::fs::write(dir.path().join(".volley/cache/captcha.flag"), "").unwrap();
    volley(&dir)
        .args(["gate", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blocked"));

    volley(&dir)
        .args(["gate", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sentinel removed"));
    assert!(!dir.path().join(".volley/cache/captcha.flag").exists());

    volley(&dir)
        .args(["gate", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No challenge pending"));
}

#[test]
fn session_set_show_clear() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    volley(&dir)
        .args(["session", "set", "sid=secret; pl=other"])
        .assert()
        .success();
    assert!(dir.path().join(".volley/session.json").exists());

    volley(&dir)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sid, pl"))
        .stdout(predicate::str::contains("secret").not());

    volley(&dir).args(["session", "clear"]).assert().success();
    assert!(!dir.path().join(".volley/session.json").exists());
    volley(&dir)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No session stored."));
}

// ---------------------------------------------------------------------------
// volley config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_flags_missing_endpoint() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    volley(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] server.endpoint is empty"));

    write_valid_config(&dir);
    volley(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid."));
}

#[test]
fn config_show_masks_token() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".volley/config.yaml"),
        "account: test\nnotifications:\n  enabled: true\n  token: abc123\n  channel_id: '42'\n",
    )
    .unwrap();

    volley(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("account: test"))
        .stdout(predicate::str::contains("abc123").not());
}

// ---------------------------------------------------------------------------
// volley run-once
// ---------------------------------------------------------------------------

#[test]
fn run_once_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    volley(&dir)
        .arg("run-once")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("server.endpoint"));
}

#[test]
fn run_once_with_empty_schedule_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_valid_config(&dir);

    volley(&dir)
        .arg("run-once")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to dispatch."));
}

#[test]
fn run_once_with_far_future_batch_does_nothing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_valid_config(&dir);
    write_future_schedule(&dir);
    volley(&dir)
        .args(["load", "--file", "future.json"])
        .assert()
        .success();

    volley(&dir)
        .arg("run-once")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to dispatch."));
}

#[test]
fn run_once_reports_expired_batch_and_exits_2() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_valid_config(&dir);
    std::fs::write(
        dir.path().join(".volley/cache/schedule.json"),
        r#"{"version":1,"schedule":{"1000":[{"id":"a","origin":"101","target":{"type":"coordinates","x":1,"y":1},"payload":{"axe":1},"kind":"attack"}]},"last_update":"2020-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    volley(&dir)
        .arg("run-once")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("aborted"))
        .stderr(predicate::str::contains("completion instant already passed"));

    // The batch left the schedule and the run was recorded.
    let snapshot: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".volley/cache/schedule.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["total"], 0);
    assert_eq!(snapshot["history"].as_array().unwrap().len(), 1);
}
