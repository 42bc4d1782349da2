use proxi_config::{FilterPolicy, SensitivityLevel, load_file, load_toml};
use rstest::rstest;

#[test]
fn empty_document_is_a_valid_default_config() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults validate");
    assert_eq!(cfg.calibration.target_mm, 600);
    assert_eq!(cfg.calibration.sensitivity_scale, 100);
    assert_eq!(cfg.wizard.far_countdown, 5);
    assert_eq!(cfg.filter.policy, FilterPolicy::Ratio);
    assert_eq!(cfg.store.namespace, "proxy");
}

#[test]
fn parses_full_document() {
    let toml = r#"
[calibration]
target_mm = 600
compensation_start = 25
compensation_end = 5400
compensation_step = 25
sensitivity_scale = 120

[filter]
policy = "tiered"
level = "high"

[wizard]
far_countdown = 8
startup_screen_before_restart = true

[presence]
policy = "ratio"

[logging]
rotation = "daily"
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.calibration.sensitivity_scale, 120);
    assert_eq!(cfg.filter.level, SensitivityLevel::High);
    assert_eq!(cfg.wizard.far_countdown, 8);
    assert!(cfg.wizard.startup_screen_before_restart);
    assert_eq!(cfg.presence_policy(), FilterPolicy::Ratio);
}

#[rstest]
#[case("[calibration]\ncompensation_step = 0", "compensation_step must be > 0")]
#[case("[calibration]\ncompensation_start = 5400", "compensation_start must be < compensation_end")]
#[case("[calibration]\nsensitivity_scale = 0", "sensitivity_scale must be > 0")]
#[case("[calibration]\nfound_mm = 400", "found_mm must be <= usable_mm")]
#[case("[wizard]\nnear_countdown = 0", "countdowns must be >= 1")]
#[case("[wizard]\ntick_ms = 100", "tick_ms must be >= wizard.poll_ms")]
#[case("[store]\nnamespace = \"\"", "namespace must not be empty")]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn unknown_policy_is_a_parse_error() {
    assert!(load_toml("[filter]\npolicy = \"fuzzy\"").is_err());
}

#[test]
fn load_file_reports_path_on_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxi.toml");
    std::fs::write(&path, "[wizard\n").unwrap();
    let err = load_file(&path).expect_err("broken file");
    assert!(format!("{err}").contains("proxi.toml"));
}
