//! Human-readable error descriptions and structured JSON error formatting.

use proxi_core::error::{BuildError, ProxiError};
use proxi_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor
            | BuildError::MissingStore
            | BuildError::MissingDisplay
            | BuildError::MissingLifecycle => format!(
                "What happened: The proximity subsystem could not be assembled ({be}).\nLikely causes: A collaborator was not wired into the builder.\nHow to fix: This is a bug in the host; report it with --log-level=debug output."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/proxi.toml for a sample."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<ProxiError>() {
        return match pe {
            ProxiError::CalibrationWarning => "What happened: Calibration failed, try again.\nLikely causes: No crosstalk candidate came close enough to the target, or the run was stopped.\nHow to fix: Stand still at 60 cm during the first run, step back to 100 cm for the second, then rerun `proxi calibrate`.".to_string(),
            ProxiError::Timeout => "What happened: The sensor did not produce data in time.\nLikely causes: Sensor not powered, wrong bus wiring, or max_ready_polls too low.\nHow to fix: Check the sensor, and consider raising sensor.max_ready_polls in the config.".to_string(),
            ProxiError::DriverInit(msg) => format!(
                "What happened: The sensor could not be initialized ({msg}).\nLikely causes: Sensor missing from the bus or a bad driver profile.\nHow to fix: Check wiring and the [sensor] section, then rerun `proxi self-check`."
            ),
            ProxiError::Driver(msg) => format!(
                "What happened: The sensor driver failed ({msg}).\nLikely causes: Bus errors or the device was reset mid-run.\nHow to fix: Rerun `proxi self-check`; if it fails, power-cycle the sensor."
            ),
            ProxiError::Config(msg) => config_hint(msg),
            ProxiError::Store(msg) => format!(
                "What happened: The calibration store could not be written ({msg}).\nLikely causes: Read-only filesystem or missing permissions.\nHow to fix: Check [store].path (or --store) points to a writable location."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(HwError::Format(detail)) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: The calibration store file is malformed ({detail}).\nLikely causes: The file was edited by hand or truncated.\nHow to fix: Fix or delete the file, or run `proxi factory-reset`."
        );
    }

    let msg = err.to_string();
    if msg.to_ascii_lowercase().contains("must be") {
        return format!(
            "What happened: Invalid argument ({msg}).\nLikely causes: A flag value out of range.\nHow to fix: See `proxi --help`."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn config_hint(msg: &str) -> String {
    let lower = msg.to_ascii_lowercase();
    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with an existing TOML file. Original: {msg}"
        );
    }
    if lower.starts_with("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nLikely causes: Typo in a key or an unknown enum value (e.g. filter.policy).\nHow to fix: Compare with etc/proxi.toml. Original: {msg}"
        );
    }
    format!(
        "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/proxi.toml for a sample."
    )
}

/// Stable exit codes: 2 config, 3 calibration warning, 4 driver, 5 timeout,
/// 6 store, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(pe) = err.downcast_ref::<ProxiError>() {
        return match pe {
            ProxiError::Config(_) => 2,
            ProxiError::CalibrationWarning => 3,
            ProxiError::Driver(_) | ProxiError::DriverInit(_) => 4,
            ProxiError::Timeout => 5,
            ProxiError::Store(_) => 6,
            ProxiError::UnexpectedResult(_) => 1,
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return 6;
    }
    // Usage errors raised by the command runners.
    if err.to_string().to_ascii_lowercase().contains("must be") {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    match err.downcast_ref::<ProxiError>() {
        Some(ProxiError::CalibrationWarning) => "CalibrationWarning",
        Some(ProxiError::Timeout) => "Timeout",
        Some(ProxiError::Driver(_)) => "Driver",
        Some(ProxiError::DriverInit(_)) => "DriverInit",
        Some(ProxiError::Store(_)) => "Store",
        Some(ProxiError::Config(_)) => "InvalidConfig",
        Some(ProxiError::UnexpectedResult(_)) => "UnexpectedResult",
        None if exit_code_for_error(err) == 2 => "InvalidConfig",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
