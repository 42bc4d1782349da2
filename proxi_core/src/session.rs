//! Exclusive access to the ranging sensor.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use proxi_traits::{Clock, RangingSensor};

pub type SensorLease<'a> = MutexGuard<'a, Box<dyn RangingSensor + Send>>;

/// Shared owner of the sensor. The worker leases it for a whole run, the
/// presence loop for one reading at a time.
#[derive(Clone)]
pub struct SensorSession {
    inner: Arc<Mutex<Box<dyn RangingSensor + Send>>>,
}

impl SensorSession {
    pub fn new(sensor: impl RangingSensor + Send + 'static) -> Self {
        Self::from_boxed(Box::new(sensor))
    }

    pub fn from_boxed(sensor: Box<dyn RangingSensor + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sensor)),
        }
    }

    /// Block until the sensor is free.
    pub fn lease(&self) -> SensorLease<'_> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Wait at most `timeout` for the sensor, polling on `clock`.
    pub fn try_lease_for(&self, timeout: Duration, clock: &dyn Clock) -> Option<SensorLease<'_>> {
        let start = clock.now();
        let step = Duration::from_millis(1);
        loop {
            match self.inner.try_lock() {
                Ok(g) => return Some(g),
                Err(TryLockError::Poisoned(p)) => return Some(p.into_inner()),
                Err(TryLockError::WouldBlock) => {}
            }
            if clock.now().saturating_duration_since(start) >= timeout {
                return None;
            }
            clock.sleep(step);
        }
    }
}
