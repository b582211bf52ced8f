use predicates::str::{contains, diff};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

#[test]
fn list_policies_prints_supported_values() {
    let expected = concat!("nearest-first\n", "weighted\n", "batch-optimal\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.arg("list-policies");
    cmd.assert().success().stdout(diff(expected));
}

#[test]
fn show_config_prints_effective_configuration() {
    let expected = concat!(
        "Policy: weighted\n",
        "Seed: 42\n",
        "Layout: grid 2x10 (accessible every 10, ev every 8)\n",
        "End time: none\n",
        "Arrivals: poisson 12/h, horizon 480\n",
        "Duration: normal (mean 120, sd 30, min 15)\n",
        "Max wait: 10\n",
        "Batch window: 5\n",
        "Vehicle types:\n",
        "- standard (weight: 0.8)\n",
        "- accessible (weight: 0.1)\n",
        "- electric (weight: 0.1)\n",
        "Preference profiles:\n",
        "- commuter (weight: 0.6, proximity: 1, price: 0.2, availability: 0, exit: 0.4)\n",
        "- budget (weight: 0.3, proximity: 0.3, price: 1, availability: 0.2, exit: 0)\n",
        "- any (weight: 0.1, proximity: 0, price: 0, availability: 0, exit: 0)\n",
        "Reservations: probability 0, lead 30, grace 15, no-show 0\n",
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args([
        "show-config",
        "--policy",
        "weighted",
        "--seed",
        "42",
        "--aisles",
        "2",
        "--rate",
        "12",
        "--max-wait",
        "10",
    ]);
    cmd.assert().success().stdout(diff(expected));
}

#[test]
fn compare_prints_one_row_per_policy() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["compare", "--seed", "3", "--horizon", "120"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("stdout should be utf-8");
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].starts_with("policy"));
    assert!(rows[1].starts_with("nearest-first"));
    assert!(rows[2].starts_with("weighted"));
    assert!(rows[3].starts_with("batch-optimal"));
}

#[test]
fn export_layout_writes_a_reloadable_file() {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be available")
        .as_nanos();
    path.push(format!("park-export-{}.toml", nanos));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args([
        "export-layout",
        "--aisles",
        "1",
        "--aisle-length",
        "2",
        "--output",
        path.to_str().unwrap(),
    ]);
    cmd.assert().success();
    let written = fs::read_to_string(&path).expect("layout should be written");
    assert!(written.contains("name = \"grid-1x2\""));
    assert!(written.contains("bidirectional = false"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args([
        "run",
        "--layout",
        path.to_str().unwrap(),
        "--horizon",
        "30",
        "--format",
        "summary",
    ]);
    cmd.assert()
        .success()
        .stdout(contains("facility: grid-1x2\n"))
        .stdout(contains("spots: 4\n"));
}

#[test]
fn export_layout_defaults_to_json_on_stdout() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["export-layout", "--aisles", "1", "--aisle-length", "1"]);
    cmd.assert()
        .success()
        .stdout(contains("\"name\": \"grid-1x1\""))
        .stdout(contains("\"kind\": \"entry\""));
}

#[test]
fn floors_flag_stacks_the_grid() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args([
        "export-layout",
        "--aisles",
        "1",
        "--aisle-length",
        "1",
        "--floors",
        "2",
    ]);
    cmd.assert()
        .success()
        .stdout(contains("\"name\": \"grid-1x1x2\""))
        .stdout(contains("\"id\": \"F1:S0-0-n\""));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("park-sim");
    cmd.args(["show-config", "--floors", "2"]);
    cmd.assert().success().stdout(contains(
        "Layout: grid 3x10 on 2 floors (accessible every 10, ev every 8)\n",
    ));
}
