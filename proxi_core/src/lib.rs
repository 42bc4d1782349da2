#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Proximity calibration and measurement core (hardware-agnostic).
//!
//! All hardware goes through `proxi_traits`: the ranging sensor, the
//! key/value store, the display surface and the device lifecycle.
//!
//! ## Architecture
//!
//! - **Store**: two calibration fields persisted per key (`store`)
//! - **Filter**: presence classification, ratio or tiered policy (`filter`)
//! - **Calibration**: crosstalk and sensitivity searches (`calibration`)
//!   run on a background thread (`worker`) reached through `link`
//! - **Wizard**: guided calibration flow and its polling loop (`wizard`)
//! - **Presence**: live readout page (`presence`)
//! - **Builder**: `Proxi`, the context object wiring it all (`builder`)

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod input;
pub mod link;
pub mod mocks;
pub mod pages;
pub mod presence;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod ui;
pub mod wizard;
pub mod worker;

pub use builder::{Proxi, ProxiBuilder};
pub use calibration::{Calibrator, CrosstalkSearch, SearchOutcome};
pub use config::{CalibrationParams, PresenceCfg, WizardCfg};
pub use error::{BuildError, ProxiError, Result};
pub use filter::{
    ClassifyPolicy, DistanceTier, FilterSettings, Policy, RatioPolicy, SensitivityLevel,
    TieredPolicy, classify, detect,
};
pub use input::{Button, ButtonEvent, ButtonGate, tap_channel};
pub use link::{AlgorithmResult, AlgorithmRunRequest, CalibrationLink, FailureKind, RunMode};
pub use pages::{Page, Pages};
pub use presence::{PresenceExit, PresenceLoop, PresenceReading};
pub use session::SensorSession;
pub use store::{CalibrationRecord, CalibrationStore, Field, StoreLayout};
pub use wizard::{Phase, Wizard, WizardExit, WizardRunner, WizardState, factory_reset};
pub use worker::CalibrationWorker;
