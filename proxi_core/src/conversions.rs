//! Bridges from the `proxi_config` schema to runtime types.

use std::time::Duration;

use proxi_traits::SensorProfile;

use crate::config::{CalibrationParams, PresenceCfg, WizardCfg};
use crate::filter::{FilterSettings, SensitivityLevel};
use crate::store::StoreLayout;

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&proxi_config::CalibrationCfg> for CalibrationParams {
    fn from(c: &proxi_config::CalibrationCfg) -> Self {
        Self {
            target_mm: c.target_mm,
            compensation_start: c.compensation_start,
            compensation_end: c.compensation_end,
            compensation_step: c.compensation_step,
            readings_per_candidate: c.readings_per_candidate,
            found_mm: c.found_mm,
            usable_mm: c.usable_mm,
            regress_mm: c.regress_mm,
            read_interval: Duration::from_millis(c.read_interval_ms),
        }
    }
}

// ── Wizard / presence ────────────────────────────────────────────────────────

impl From<&proxi_config::WizardCfg> for WizardCfg {
    fn from(c: &proxi_config::WizardCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
            tick: Duration::from_millis(c.tick_ms),
            near_countdown: c.near_countdown,
            far_countdown: c.far_countdown,
            dwell: Duration::from_millis(c.dwell_ms),
            startup_screen_before_restart: c.startup_screen_before_restart,
            gui_lock_timeout: Duration::from_millis(c.gui_lock_timeout_ms),
            long_press: Duration::from_millis(c.long_press_ms),
        }
    }
}

impl From<&proxi_config::PresenceCfg> for PresenceCfg {
    fn from(c: &proxi_config::PresenceCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
        }
    }
}

// ── Filter ───────────────────────────────────────────────────────────────────

impl From<proxi_config::SensitivityLevel> for SensitivityLevel {
    fn from(l: proxi_config::SensitivityLevel) -> Self {
        match l {
            proxi_config::SensitivityLevel::Off => Self::Off,
            proxi_config::SensitivityLevel::Low => Self::Low,
            proxi_config::SensitivityLevel::Med => Self::Med,
            proxi_config::SensitivityLevel::High => Self::High,
        }
    }
}

impl From<&proxi_config::FilterCfg> for FilterSettings {
    fn from(c: &proxi_config::FilterCfg) -> Self {
        Self {
            level: c.level.into(),
            max_range_mm: c.max_range_mm,
        }
    }
}

// ── Sensor / store (foreign targets, so plain functions) ─────────────────────

pub fn sensor_profile(c: &proxi_config::SensorCfg) -> SensorProfile {
    SensorProfile {
        ranging_budget_us: c.ranging_budget_us,
        calibration_budget_us: c.calibration_budget_us,
        signal_rate_limit_mcps: c.signal_rate_limit_mcps,
        sigma_limit_mm: c.sigma_limit_mm,
        pre_range_vcsel_period: c.pre_range_vcsel_period,
        final_range_vcsel_period: c.final_range_vcsel_period,
        offset_um: c.offset_um,
    }
}

pub fn store_layout(cfg: &proxi_config::Config) -> StoreLayout {
    StoreLayout {
        namespace: cfg.store.namespace.clone(),
        sensitivity_scale: cfg.calibration.sensitivity_scale,
    }
}
