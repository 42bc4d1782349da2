//! Durable calibration record on top of a namespaced key/value store.
//!
//! Two fields, each under its own key, so a torn write can never mix an old
//! and a new value inside one entry. Reads fail open to the factory
//! defaults; writes log and carry on.

use std::sync::{Arc, Mutex, MutexGuard};

use proxi_traits::KvStore;
use tracing::{debug, info, warn};

use crate::error::{ProxiError, Result};
use crate::hw_error::map_hw_error;

pub const DEFAULT_NAMESPACE: &str = "proxy";
pub const KEY_COMPENSATION: &str = "calibr";
pub const KEY_SENSITIVITY: &str = "sens";

pub const DEFAULT_COMPENSATION: u32 = 50;
pub const DEFAULT_SENSITIVITY: f32 = 50.0;
pub const DEFAULT_SENSITIVITY_SCALE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    pub crosstalk_compensation: u32,
    /// Minimum signal/ambient ratio a reading needs to count as presence.
    pub sensitivity_ratio: f32,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            crosstalk_compensation: DEFAULT_COMPENSATION,
            sensitivity_ratio: DEFAULT_SENSITIVITY,
        }
    }
}

/// One field of the record together with the value to persist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field {
    CrosstalkCompensation(u32),
    SensitivityRatio(f32),
}

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::CrosstalkCompensation(_) => KEY_COMPENSATION,
            Field::SensitivityRatio(_) => KEY_SENSITIVITY,
        }
    }
}

/// Where and how the record is laid out in the key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub namespace: String,
    /// Fixed-point scale of the stored sensitivity ratio.
    pub sensitivity_scale: u32,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            sensitivity_scale: DEFAULT_SENSITIVITY_SCALE,
        }
    }
}

/// Encode a ratio as `round(ratio * scale)`, clamped to u32. NaN and
/// infinities encode as 0.
pub fn encode_sensitivity(ratio: f32, scale: u32) -> u32 {
    if !ratio.is_finite() {
        return 0;
    }
    let scaled = (f64::from(ratio) * f64::from(scale)).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

pub fn decode_sensitivity(raw: u32, scale: u32) -> f32 {
    (f64::from(raw) / f64::from(scale.max(1))) as f32
}

/// Shared handle to the calibration record. Clones refer to the same store.
#[derive(Clone)]
pub struct CalibrationStore {
    kv: Arc<Mutex<Box<dyn KvStore + Send>>>,
    layout: StoreLayout,
}

impl core::fmt::Debug for CalibrationStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CalibrationStore")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl CalibrationStore {
    pub fn new(kv: impl KvStore + Send + 'static, layout: StoreLayout) -> Self {
        Self::from_boxed(Box::new(kv), layout)
    }

    pub fn from_boxed(kv: Box<dyn KvStore + Send>, layout: StoreLayout) -> Self {
        Self {
            kv: Arc::new(Mutex::new(kv)),
            layout,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn kv(&self) -> MutexGuard<'_, Box<dyn KvStore + Send>> {
        self.kv.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn read_field(&self, kv: &dyn KvStore, key: &str) -> Option<u32> {
        match kv.get_u32(&self.layout.namespace, key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "store read failed; using default");
                None
            }
        }
    }

    /// Current record. Never fails: each missing or unreadable field falls
    /// back to its default on its own.
    pub fn load(&self) -> CalibrationRecord {
        let kv = self.kv();
        let defaults = CalibrationRecord::default();
        let crosstalk_compensation = self
            .read_field(&**kv, KEY_COMPENSATION)
            .unwrap_or(defaults.crosstalk_compensation);
        let sensitivity_ratio = self
            .read_field(&**kv, KEY_SENSITIVITY)
            .map_or(defaults.sensitivity_ratio, |raw| {
                decode_sensitivity(raw, self.layout.sensitivity_scale)
            });
        CalibrationRecord {
            crosstalk_compensation,
            sensitivity_ratio,
        }
    }

    /// Write and commit one field. A failed write is logged and dropped;
    /// the previous value (or the default) stays in effect.
    pub fn save(&self, field: Field) {
        let raw = match field {
            Field::CrosstalkCompensation(v) => v,
            Field::SensitivityRatio(r) => encode_sensitivity(r, self.layout.sensitivity_scale),
        };
        let key = field.key();
        let mut kv = self.kv();
        let res = kv
            .set_u32(&self.layout.namespace, key, raw)
            .and_then(|()| kv.commit());
        match res {
            Ok(()) => debug!(key, raw, "calibration field saved"),
            Err(e) => warn!(key, raw, error = %e, "calibration field not saved"),
        }
    }

    /// Erase every namespace. Durable when this returns Ok; the caller is
    /// expected to restart the device next.
    pub fn erase_all(&self) -> Result<()> {
        self.kv()
            .erase_all()
            .map_err(|e| eyre::Report::new(ProxiError::Store(map_hw_error(&*e).to_string())))?;
        info!("calibration store erased");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rounds_and_clamps() {
        assert_eq!(encode_sensitivity(50.0, 100), 5000);
        assert_eq!(encode_sensitivity(12.345, 100), 1235);
        assert_eq!(encode_sensitivity(-3.0, 100), 0);
        assert_eq!(encode_sensitivity(f32::NAN, 100), 0);
        assert_eq!(encode_sensitivity(f32::INFINITY, 100), 0);
        assert_eq!(encode_sensitivity(1e30, 100), u32::MAX);
    }

    #[test]
    fn decode_uses_same_scale() {
        assert!((decode_sensitivity(5000, 100) - 50.0).abs() < 1e-6);
        assert!((decode_sensitivity(6000, 120) - 50.0).abs() < 1e-6);
    }
}
