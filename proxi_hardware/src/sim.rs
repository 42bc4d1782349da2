//! Simulated time-of-flight sensor.
//!
//! The scene models a target at a fixed distance and an optical crosstalk
//! bias that shrinks linearly as the applied compensation approaches an
//! optimum. That gives the crosstalk sweep a single, known minimum.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use proxi_traits::{BoxError, Clock, DriverMode, InitParams, Measurement, RangingSensor};
use tracing::trace;

use crate::error::HwError;
use crate::util::wait_until_ready;

/// Jitter applied to successive readings, in mm.
const JITTER_MM: [i32; 5] = [0, 2, -2, 1, -1];
/// Upper bound of the reported range, matching the device's out-of-range code.
const MAX_RANGE_MM: i32 = 8190;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimScene {
    /// True distance to the target.
    pub distance_mm: u16,
    /// Compensation value that removes the crosstalk bias entirely.
    pub optimal_compensation: u32,
    /// Range shortening per unit of missing compensation.
    pub bias_mm_per_unit: f32,
    /// Return signal rate (16.16 MCps) at `distance_mm`.
    pub signal_rate: u32,
    /// Ambient rate (16.16 MCps).
    pub ambient_rate: u32,
    /// Range status reported with every sample.
    pub status: u8,
}

impl Default for SimScene {
    fn default() -> Self {
        Self {
            distance_mm: 600,
            optimal_compensation: 1500,
            bias_mm_per_unit: 0.25,
            signal_rate: 20 << 16,
            ambient_rate: 1 << 16,
            status: 0,
        }
    }
}

/// Fault injection knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Fail the n-th call to `init` (1-based) with a control interface error.
    pub fail_init_on: Option<u32>,
    /// Time out every n-th reading.
    pub timeout_every: Option<u32>,
}

#[derive(Debug)]
struct SimState {
    scene: SimScene,
    faults: SimFaults,
    active: Option<InitParams>,
    inits: u32,
    reads: u32,
}

/// Shared handle used to move the simulated target or inject faults while
/// the sensor itself is owned elsewhere.
#[derive(Debug, Clone)]
pub struct SimControl(Arc<Mutex<SimState>>);

impl SimControl {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking reader cannot leave the state half-written.
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_scene(&self, scene: SimScene) {
        self.lock().scene = scene;
    }

    pub fn set_distance(&self, distance_mm: u16) {
        self.lock().scene.distance_mm = distance_mm;
    }

    pub fn set_faults(&self, faults: SimFaults) {
        self.lock().faults = faults;
    }

    /// Number of `init` calls seen so far.
    pub fn init_count(&self) -> u32 {
        self.lock().inits
    }

    /// Parameters of the currently running session, if ranging.
    pub fn active(&self) -> Option<InitParams> {
        self.lock().active
    }
}

pub struct SimulatedSensor {
    control: SimControl,
    clock: Arc<dyn Clock + Send + Sync>,
    ready_after_polls: u32,
    max_polls: u32,
    poll_interval: Duration,
}

impl SimulatedSensor {
    pub fn new(scene: SimScene, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            control: SimControl(Arc::new(Mutex::new(SimState {
                scene,
                faults: SimFaults::default(),
                active: None,
                inits: 0,
                reads: 0,
            }))),
            clock,
            ready_after_polls: 2,
            max_polls: 200,
            poll_interval: Duration::from_millis(1),
        }
    }

    /// Bound on data-ready polls per reading.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    /// Range the scene produces for a given compensation, before jitter.
    pub fn modelled_range(scene: &SimScene, compensation: u32) -> i32 {
        let missing = i64::from(scene.optimal_compensation) - i64::from(compensation);
        let bias = (missing as f32 * scene.bias_mm_per_unit).round() as i32;
        (i32::from(scene.distance_mm) - bias).clamp(0, MAX_RANGE_MM)
    }
}

impl RangingSensor for SimulatedSensor {
    fn init(&mut self, params: &InitParams) -> Result<(), BoxError> {
        let mut st = self.control.lock();
        st.inits += 1;
        if st.faults.fail_init_on == Some(st.inits) {
            st.active = None;
            return Err(Box::new(HwError::ControlInterface(
                "i2c init failed".to_string(),
            )));
        }
        let budget = match params.mode {
            DriverMode::Ranging => params.profile.ranging_budget_us,
            DriverMode::Calibration => params.profile.calibration_budget_us,
        };
        trace!(compensation = params.compensation, budget_us = budget, "sim sensor init");
        st.active = Some(*params);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), BoxError> {
        self.control.lock().active = None;
        Ok(())
    }

    fn get_measurement(&mut self) -> Result<Measurement, BoxError> {
        let mut polls = 0;
        let ready_after = self.ready_after_polls;
        wait_until_ready(
            || {
                polls += 1;
                Ok(polls > ready_after)
            },
            self.max_polls,
            self.poll_interval,
            self.clock.as_ref(),
        )
        .map_err(|e| Box::new(e) as BoxError)?;

        let mut st = self.control.lock();
        let Some(params) = st.active else {
            return Err(Box::new(HwError::ControlInterface(
                "sensor not ranging".to_string(),
            )));
        };
        st.reads += 1;
        if let Some(n) = st.faults.timeout_every
            && n > 0
            && st.reads % n == 0
        {
            return Err(Box::new(HwError::Timeout));
        }

        let scene = st.scene;
        let jitter = JITTER_MM[(st.reads as usize) % JITTER_MM.len()];
        let range = (Self::modelled_range(&scene, params.compensation) + jitter).clamp(0, MAX_RANGE_MM);
        // Return signal falls off with the square of the reported distance.
        let reference = f64::from(scene.distance_mm.max(1));
        let scale = (reference / f64::from(range.max(1))).powi(2);
        let signal_rate = (f64::from(scene.signal_rate) * scale).min(f64::from(u32::MAX)) as u32;

        Ok(Measurement {
            range_mm: range as u16,
            signal_rate,
            ambient_rate: scene.ambient_rate,
            status: scene.status,
        })
    }
}
