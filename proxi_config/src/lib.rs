#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the proximity subsystem.
//!
//! Every section is optional and falls back to the firmware defaults, so an
//! empty document is a valid configuration. `Config::validate` rejects
//! values the core cannot run with.
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Fixed driver tuning. Passed to the sensor unchanged.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    /// Timing budget for normal ranging (µs).
    pub ranging_budget_us: u32,
    /// Timing budget while sweeping crosstalk candidates (µs).
    pub calibration_budget_us: u32,
    pub signal_rate_limit_mcps: f32,
    pub sigma_limit_mm: f32,
    pub pre_range_vcsel_period: u8,
    pub final_range_vcsel_period: u8,
    /// Part-to-part range offset (µm).
    pub offset_um: i32,
    /// Max data-ready polls per reading before a timeout is reported.
    pub max_ready_polls: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            ranging_budget_us: 200_000,
            calibration_budget_us: 33_000,
            signal_rate_limit_mcps: 0.1,
            sigma_limit_mm: 60.0,
            pre_range_vcsel_period: 18,
            final_range_vcsel_period: 14,
            offset_um: 10_800,
            max_ready_polls: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Distance the user stands at during the crosstalk search (mm).
    pub target_mm: u16,
    pub compensation_start: u32,
    /// Exclusive upper bound of the candidate range.
    pub compensation_end: u32,
    pub compensation_step: u32,
    pub readings_per_candidate: u8,
    /// Deviation below which the search stops immediately (mm).
    pub found_mm: u32,
    /// Deviation below which a best candidate is worth persisting (mm).
    pub usable_mm: u32,
    /// Regression beyond best that counts towards the stall counter (mm).
    pub regress_mm: u32,
    pub read_interval_ms: u64,
    /// Fixed-point scale of the stored sensitivity ratio.
    pub sensitivity_scale: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            target_mm: 600,
            compensation_start: 25,
            compensation_end: 5400,
            compensation_step: 25,
            readings_per_candidate: 3,
            found_mm: 50,
            usable_mm: 300,
            regress_mm: 100,
            read_interval_ms: 20,
            sensitivity_scale: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Signal/ambient ratio against the calibrated sensitivity.
    #[default]
    Ratio,
    /// Fixed thresholds on the signal × range metric.
    Tiered,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    Off,
    Low,
    #[default]
    Med,
    High,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterCfg {
    pub policy: FilterPolicy,
    /// Level used by the tiered policy.
    pub level: SensitivityLevel,
    /// Ratio policy only accepts readings closer than this (mm).
    pub max_range_mm: u16,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            policy: FilterPolicy::Ratio,
            level: SensitivityLevel::Med,
            max_range_mm: 800,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WizardCfg {
    pub poll_ms: u64,
    pub tick_ms: u64,
    pub near_countdown: u8,
    /// Countdown before the far-field run (5 or 8 depending on the unit).
    pub far_countdown: u8,
    /// How long the terminal screen stays up before restart.
    pub dwell_ms: u64,
    /// Draw the neutral startup screen right before restarting.
    pub startup_screen_before_restart: bool,
    /// Bounded wait for the display guard.
    pub gui_lock_timeout_ms: u64,
    /// Hold time before a press counts as a tap.
    pub long_press_ms: u64,
}

impl Default for WizardCfg {
    fn default() -> Self {
        Self {
            poll_ms: 200,
            tick_ms: 1000,
            near_countdown: 5,
            far_countdown: 5,
            dwell_ms: 2000,
            startup_screen_before_restart: false,
            gui_lock_timeout_ms: 1000,
            long_press_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PresenceCfg {
    pub poll_ms: u64,
    /// Policy override for the presence page; falls back to `[filter].policy`.
    pub policy: Option<FilterPolicy>,
}

impl Default for PresenceCfg {
    fn default() -> Self {
        Self {
            poll_ms: 200,
            policy: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreCfg {
    pub path: PathBuf,
    pub namespace: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("proxi_store.toml"),
            namespace: "proxy".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Scene for the simulated sensor used by the host CLI.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorCfg {
    pub near_distance_mm: u16,
    /// Where the simulated user stands for the far-field run.
    pub far_distance_mm: u16,
    pub optimal_compensation: u32,
    pub bias_mm_per_unit: f32,
    pub signal_mcps: f32,
    pub ambient_mcps: f32,
}

impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            near_distance_mm: 600,
            far_distance_mm: 1000,
            optimal_compensation: 1500,
            bias_mm_per_unit: 0.25,
            signal_mcps: 20.0,
            ambient_mcps: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorCfg,
    pub calibration: CalibrationCfg,
    pub filter: FilterCfg,
    pub wizard: WizardCfg,
    pub presence: PresenceCfg,
    pub store: StoreCfg,
    pub logging: Logging,
    pub simulator: SimulatorCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if self.sensor.ranging_budget_us == 0 || self.sensor.calibration_budget_us == 0 {
            eyre::bail!("sensor timing budgets must be > 0");
        }
        if self.sensor.max_ready_polls == 0 {
            eyre::bail!("sensor.max_ready_polls must be >= 1");
        }
        if !self.sensor.signal_rate_limit_mcps.is_finite()
            || self.sensor.signal_rate_limit_mcps < 0.0
        {
            eyre::bail!("sensor.signal_rate_limit_mcps must be a finite value >= 0");
        }

        // Calibration
        let c = &self.calibration;
        if c.target_mm == 0 {
            eyre::bail!("calibration.target_mm must be > 0");
        }
        if c.compensation_step == 0 {
            eyre::bail!("calibration.compensation_step must be > 0");
        }
        if c.compensation_start >= c.compensation_end {
            eyre::bail!("calibration.compensation_start must be < compensation_end");
        }
        if c.readings_per_candidate == 0 {
            eyre::bail!("calibration.readings_per_candidate must be >= 1");
        }
        if c.found_mm > c.usable_mm {
            eyre::bail!("calibration.found_mm must be <= usable_mm");
        }
        if c.sensitivity_scale == 0 {
            eyre::bail!("calibration.sensitivity_scale must be > 0");
        }
        if c.read_interval_ms > 1000 {
            eyre::bail!("calibration.read_interval_ms is unreasonably large (>1s)");
        }

        // Filter
        if self.filter.max_range_mm == 0 {
            eyre::bail!("filter.max_range_mm must be > 0");
        }

        // Wizard
        let w = &self.wizard;
        if w.poll_ms == 0 {
            eyre::bail!("wizard.poll_ms must be >= 1");
        }
        if w.tick_ms < w.poll_ms {
            eyre::bail!("wizard.tick_ms must be >= wizard.poll_ms");
        }
        if w.near_countdown == 0 || w.far_countdown == 0 {
            eyre::bail!("wizard countdowns must be >= 1");
        }
        if w.dwell_ms > 60_000 {
            eyre::bail!("wizard.dwell_ms is unreasonably large (>1min)");
        }
        if w.gui_lock_timeout_ms == 0 {
            eyre::bail!("wizard.gui_lock_timeout_ms must be >= 1");
        }

        // Presence
        if self.presence.poll_ms == 0 {
            eyre::bail!("presence.poll_ms must be >= 1");
        }

        // Store
        if self.store.namespace.is_empty() {
            eyre::bail!("store.namespace must not be empty");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulator
        if self.simulator.ambient_mcps <= 0.0 || self.simulator.signal_mcps <= 0.0 {
            eyre::bail!("simulator rates must be > 0");
        }

        Ok(())
    }

    /// Effective policy for the presence page.
    pub fn presence_policy(&self) -> FilterPolicy {
        self.presence.policy.unwrap_or(self.filter.policy)
    }
}
