use predicates::str::contains;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn write_temp(contents: &str, extension: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be available")
        .as_nanos();
    path.push(format!("park-errors-{}.{}", nanos, extension));
    fs::write(&path, contents).expect("temp write should succeed");
    path
}

#[test]
fn zero_batch_window_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--policy", "batch-optimal", "--batch-window", "0"]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: batch window must be > 0 for the batch-optimal policy"));
}

#[test]
fn zero_rate_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--rate", "0"]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: arrival rate must be > 0 (got 0)"));
}

#[test]
fn negative_edge_weight_fails() {
    let layout = write_temp(
        r#"{
  "nodes": [
    { "id": "gate", "kind": "entry" },
    { "id": "A", "kind": "spot" },
    { "id": "out", "kind": "exit" }
  ],
  "edges": [
    { "from": "gate", "to": "A", "weight": -1 },
    { "from": "A", "to": "out", "weight": 1 }
  ]
}"#,
        "json",
    );
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--layout", layout.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: edge #0 (gate -> A) has negative weight -1"));
}

#[test]
fn unreachable_spot_fails() {
    let layout = write_temp(
        r#"{
  "nodes": [
    { "id": "gate", "kind": "entry" },
    { "id": "A", "kind": "spot" },
    { "id": "island", "kind": "spot" },
    { "id": "out", "kind": "exit" }
  ],
  "edges": [
    { "from": "gate", "to": "A", "weight": 1 },
    { "from": "A", "to": "out", "weight": 1 }
  ]
}"#,
        "json",
    );
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--layout", layout.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: spot 'island' is unreachable from every entry"));
}

#[test]
fn unsupported_config_extension_fails() {
    let config = write_temp("seed: 1\n", "yaml");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--config", config.to_str().unwrap()]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: unsupported config format 'yaml'"));
}

#[test]
fn unknown_policy_is_a_cli_error() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["run", "--policy", "random"]);
    cmd.assert()
        .failure()
        .stderr(contains("Error: "))
        .stderr(contains("random"));
}
