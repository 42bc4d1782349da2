//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "proxi", version, about = "Proximity sensor calibration CLI (simulated sensor)")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/proxi.toml")]
    pub config: PathBuf,

    /// Calibration store file; overrides `[store].path`
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Print screens, results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Presence classification policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PolicyArg {
    /// Signal/ambient ratio against the calibrated sensitivity
    Ratio,
    /// Fixed signal x range thresholds
    Tiered,
}

impl From<PolicyArg> for proxi_config::FilterPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Ratio => proxi_config::FilterPolicy::Ratio,
            PolicyArg::Tiered => proxi_config::FilterPolicy::Tiered,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the two-stage calibration wizard against the simulated sensor
    Calibrate {
        /// Run on a virtual clock; countdowns and dwell finish instantly
        #[arg(long, action = ArgAction::SetTrue)]
        virtual_time: bool,
        /// Press STOP once this much (clock) time has passed
        #[arg(long, value_name = "MS")]
        cancel_after_ms: Option<u64>,
    },
    /// Poll the presence test page
    Presence {
        /// Number of readings to take
        #[arg(long, value_name = "N", default_value_t = 10)]
        polls: u64,
        /// Override the configured presence policy
        #[arg(long, value_enum, value_name = "POLICY")]
        policy: Option<PolicyArg>,
        /// Run on a virtual clock
        #[arg(long, action = ArgAction::SetTrue)]
        virtual_time: bool,
    },
    /// Print the stored calibration record
    Show,
    /// Erase the calibration store and request a restart
    FactoryReset,
    /// Quick health check (config, store and one sensor reading)
    SelfCheck,
}
