//! Presence classification of raw ranging samples.
//!
//! `classify` is the only entry point: it rejects samples carrying a
//! non-zero range status before any policy sees them.

use proxi_traits::Measurement;

use crate::store::CalibrationRecord;

/// Thresholds on `(signal & 0xFFFF_0000) * range` for the tiered policy.
pub const SENS_HIGH: u64 = 17_500_000; // ~100 cm
pub const SENS_MED: u64 = 43_500_000; // ~80 cm
pub const SENS_LOW: u64 = 116_000_000; // ~50 cm

pub const DEFAULT_MAX_RANGE_MM: u16 = 800;

pub trait ClassifyPolicy {
    /// Decide on a sample already known to have status 0.
    fn accepts(&self, m: &Measurement) -> bool;
}

/// True when the sample counts as presence under `policy`.
pub fn classify<P: ClassifyPolicy + ?Sized>(m: &Measurement, policy: &P) -> bool {
    m.status == 0 && policy.accepts(m)
}

/// Range of an accepted sample, `None` otherwise.
pub fn detect<P: ClassifyPolicy + ?Sized>(m: &Measurement, policy: &P) -> Option<u16> {
    classify(m, policy).then_some(m.range_mm)
}

/// Signal/ambient ratio against the calibrated sensitivity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioPolicy {
    pub sensitivity: f32,
    pub max_range_mm: u16,
}

impl RatioPolicy {
    pub fn from_record(record: &CalibrationRecord, max_range_mm: u16) -> Self {
        Self {
            sensitivity: record.sensitivity_ratio,
            max_range_mm,
        }
    }
}

/// Signal over ambient as plain float division: a zero ambient gives an
/// infinite ratio, and 0/0 gives NaN which never compares greater.
pub fn signal_ambient_ratio(m: &Measurement) -> f32 {
    m.signal_rate as f32 / m.ambient_rate as f32
}

impl ClassifyPolicy for RatioPolicy {
    fn accepts(&self, m: &Measurement) -> bool {
        signal_ambient_ratio(m) > self.sensitivity && m.range_mm < self.max_range_mm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensitivityLevel {
    Off,
    Low,
    #[default]
    Med,
    High,
}

impl SensitivityLevel {
    pub fn threshold(self) -> Option<u64> {
        match self {
            SensitivityLevel::Off => None,
            SensitivityLevel::Low => Some(SENS_LOW),
            SensitivityLevel::Med => Some(SENS_MED),
            SensitivityLevel::High => Some(SENS_HIGH),
        }
    }
}

/// Fixed thresholds, independent of calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredPolicy {
    pub level: SensitivityLevel,
}

/// Integer part of the signal rate times range.
pub fn tiered_metric(m: &Measurement) -> u64 {
    u64::from(m.signal_rate & 0xFFFF_0000) * u64::from(m.range_mm)
}

impl ClassifyPolicy for TieredPolicy {
    fn accepts(&self, m: &Measurement) -> bool {
        self.level
            .threshold()
            .is_some_and(|t| tiered_metric(m) > t)
    }
}

/// Policy-independent filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSettings {
    pub level: SensitivityLevel,
    pub max_range_mm: u16,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            level: SensitivityLevel::Med,
            max_range_mm: DEFAULT_MAX_RANGE_MM,
        }
    }
}

/// Policy picked by configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    Ratio(RatioPolicy),
    Tiered(TieredPolicy),
}

impl Policy {
    /// Build the configured policy. The ratio policy snapshots the record,
    /// so it reflects whatever was committed last.
    pub fn select(
        kind: proxi_config::FilterPolicy,
        settings: &FilterSettings,
        record: &CalibrationRecord,
    ) -> Self {
        match kind {
            proxi_config::FilterPolicy::Ratio => {
                Policy::Ratio(RatioPolicy::from_record(record, settings.max_range_mm))
            }
            proxi_config::FilterPolicy::Tiered => Policy::Tiered(TieredPolicy {
                level: settings.level,
            }),
        }
    }
}

impl ClassifyPolicy for Policy {
    fn accepts(&self, m: &Measurement) -> bool {
        match self {
            Policy::Ratio(p) => p.accepts(m),
            Policy::Tiered(p) => p.accepts(m),
        }
    }
}

/// Coarse distance band shown on the presence page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceTier {
    Near,
    Medium,
    Far,
    NoProxy,
}

impl DistanceTier {
    pub fn of(range_mm: u16) -> Self {
        match range_mm {
            0..200 => DistanceTier::Near,
            200..400 => DistanceTier::Medium,
            400..600 => DistanceTier::Far,
            _ => DistanceTier::NoProxy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DistanceTier::Near => "NEAR",
            DistanceTier::Medium => "MEDIUM",
            DistanceTier::Far => "FAR",
            DistanceTier::NoProxy => "NO PROXY",
        }
    }
}
