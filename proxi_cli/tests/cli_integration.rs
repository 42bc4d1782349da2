use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Short timings so real-clock runs stay quick; virtual-time runs ignore them anyway.
fn write_valid_config(dir: &TempDir) -> PathBuf {
    let store = dir.path().join("store.toml");
    let toml = format!(
        r#"
[calibration]
read_interval_ms = 1

[wizard]
poll_ms = 10
tick_ms = 10
near_countdown = 2
far_countdown = 2
dwell_ms = 10

[presence]
poll_ms = 5

[store]
path = "{}"
"#,
        store.display().to_string().replace('\\', "/")
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn proxi(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("proxi").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("warn");
    cmd
}

fn last_json_line(out: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(out);
    let line = text.lines().last().expect("some output");
    serde_json::from_str(line).unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["show"], 0, "crosstalk_compensation: 50", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["presence", "--polls", "3", "--virtual-time"], 0, "polls=3", "stdout")]
#[case(&["presence", "--policy", "bogus"], 2, "invalid value", "stderr")]
#[case(&["presence", "--polls", "0"], 2, "--polls must be >= 1", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = proxi(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn calibrate_persists_and_show_reads_it_back() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = proxi(&cfg)
        .args(["--json", "calibrate", "--virtual-time"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let summary = last_json_line(&out.stdout);
    assert_eq!(summary["outcome"], "completed");
    assert_eq!(summary["restarts"], 1);
    let xtalk = summary["crosstalk_compensation"].as_u64().unwrap();
    assert!((1275..=1500).contains(&xtalk), "xtalk {xtalk}");

    // Screens are printed before the summary; the terminal one shows the result.
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Calibration") && text.contains("completed"));

    let out = proxi(&cfg).args(["--json", "show"]).output().unwrap();
    assert!(out.status.success());
    let shown = last_json_line(&out.stdout);
    assert_eq!(shown["crosstalk_compensation"], xtalk);
    assert_eq!(shown["namespace"], "proxy");
    let ratio = shown["sensitivity_ratio"].as_f64().unwrap();
    assert!(ratio > 20.0 && ratio < 25.0, "ratio {ratio}");
}

#[test]
fn cancel_during_countdown_keeps_defaults() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    proxi(&cfg)
        .args(["calibrate", "--virtual-time", "--cancel-after-ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration cancelled"))
        .stdout(predicate::str::contains("crosstalk_compensation=50"))
        .stdout(predicate::str::contains("restarts=1"));

    proxi(&cfg)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("sensitivity_ratio: 50.00"));
}

#[test]
fn factory_reset_erases_store() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let store = dir.path().join("store.toml");
    fs::write(&store, "[proxy]\ncalibr = 1400\nsens = 2200\n").unwrap();

    proxi(&cfg)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("crosstalk_compensation: 1400"))
        .stdout(predicate::str::contains("sensitivity_ratio: 22.00"));

    proxi(&cfg)
        .arg("factory-reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("restart requested"));

    let left: toml::Table = toml::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
    assert!(left.is_empty());
    proxi(&cfg)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("crosstalk_compensation: 50"));
}

#[test]
fn store_flag_overrides_config_path() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let other = dir.path().join("other.toml");
    fs::write(&other, "[proxy]\ncalibr = 777\n").unwrap();

    proxi(&cfg)
        .arg("--store")
        .arg(&other)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("crosstalk_compensation: 777"));
}

#[test]
fn presence_json_reports_policy_and_counts() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = proxi(&cfg)
        .args(["--json", "presence", "--polls", "4", "--policy", "tiered", "--virtual-time"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v = last_json_line(&out.stdout);
    assert_eq!(v["policy"], "tiered");
    assert_eq!(v["polls"], 4);
    let total = v["detected"].as_u64().unwrap()
        + v["no_reading"].as_u64().unwrap()
        + v["errors"].as_u64().unwrap();
    assert_eq!(total, 4);
}

#[test]
fn invalid_config_is_humanized() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[wizard]\npoll_ms = 0\n").unwrap();

    proxi(&cfg)
        .arg("show")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains("wizard.poll_ms"));
}

#[test]
fn json_mode_reports_structured_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[filter]\npolicy = \"fuzzy\"\n").unwrap();

    let out = proxi(&cfg).args(["--json", "show"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    let v = last_json_line(&out.stderr);
    assert_eq!(v["reason"], "InvalidConfig");
    assert!(v["message"].as_str().unwrap().contains("not valid TOML"));
}

#[test]
fn malformed_store_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    fs::write(dir.path().join("store.toml"), "this is = = not toml").unwrap();

    proxi(&cfg)
        .arg("show")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("malformed"));
}
