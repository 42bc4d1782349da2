//! Runtime configuration for the calibration core.
//!
//! Kept apart from the TOML schema in `proxi_config`; see `conversions`.

use std::time::Duration;

/// Parameters of both calibration searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationParams {
    /// Distance the user stands at during the crosstalk search.
    pub target_mm: u16,
    pub compensation_start: u32,
    /// Exclusive.
    pub compensation_end: u32,
    pub compensation_step: u32,
    pub readings_per_candidate: u8,
    pub found_mm: u32,
    pub usable_mm: u32,
    pub regress_mm: u32,
    pub read_interval: Duration,
}

impl Default for CalibrationParams {
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
            read_interval: Duration::from_millis(20),
        }
    }
}

impl CalibrationParams {
    /// Compensation candidates in sweep order.
    pub fn candidates(&self) -> impl Iterator<Item = u32> + use<> {
        let step = self.compensation_step.max(1) as usize;
        (self.compensation_start..self.compensation_end).step_by(step)
    }
}

/// Timing and text knobs of the calibration wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardCfg {
    pub poll: Duration,
    pub tick: Duration,
    pub near_countdown: u8,
    pub far_countdown: u8,
    pub dwell: Duration,
    pub startup_screen_before_restart: bool,
    pub gui_lock_timeout: Duration,
    pub long_press: Duration,
}

impl Default for WizardCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(200),
            tick: Duration::from_millis(1000),
            near_countdown: 5,
            far_countdown: 5,
            dwell: Duration::from_millis(2000),
            startup_screen_before_restart: false,
            gui_lock_timeout: Duration::from_millis(1000),
            long_press: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceCfg {
    pub poll: Duration,
}

impl Default for PresenceCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(200),
        }
    }
}
