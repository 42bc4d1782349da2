//! The two calibration searches.
//!
//! `CrosstalkSearch` holds the pure decision state of the near-field sweep
//! so it can be driven from recorded ranges; `Calibrator` runs both
//! searches against a live sensor, honouring the shared abort flag between
//! every read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use proxi_traits::{Clock, DriverMode, InitParams, Measurement, RangingSensor, SensorProfile};
use tracing::{debug, error, info, warn};

use crate::config::CalibrationParams;
use crate::error::Result;
use crate::filter::signal_ambient_ratio;
use crate::hw_error::{map_hw_error, map_init_error};
use crate::link::{AlgorithmResult, FailureKind, RunMode};
use crate::store::{CalibrationStore, Field};

/// Result of one search that did not hit a driver error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchOutcome<T> {
    /// Value found and persisted.
    Saved(T),
    /// Nothing usable, or aborted. Nothing was persisted.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Best {
    pub compensation: u32,
    /// |target - range| of the best reading.
    pub deviation_mm: u32,
}

/// Decision state of the crosstalk sweep.
#[derive(Debug, Clone)]
pub struct CrosstalkSearch {
    target_mm: u32,
    found_mm: u32,
    usable_mm: u32,
    regress_mm: u32,
    readings: u32,
    best: Option<Best>,
    stall: u32,
    found: bool,
}

impl CrosstalkSearch {
    pub fn new(params: &CalibrationParams) -> Self {
        Self {
            target_mm: u32::from(params.target_mm),
            found_mm: params.found_mm,
            usable_mm: params.usable_mm,
            regress_mm: params.regress_mm,
            readings: u32::from(params.readings_per_candidate),
            best: None,
            stall: 0,
            found: false,
        }
    }

    /// Feed one successful reading taken with `compensation` applied.
    pub fn observe(&mut self, compensation: u32, range_mm: u16) {
        let deviation = self.target_mm.abs_diff(u32::from(range_mm));
        match self.best {
            Some(best) if deviation >= best.deviation_mm => {
                if best.deviation_mm < self.usable_mm
                    && deviation - best.deviation_mm > self.regress_mm
                {
                    // Compared before the increment.
                    let before = self.stall;
                    self.stall = self.stall.saturating_add(1);
                    if before > (best.deviation_mm >> 6) * self.readings {
                        debug!(compensation, stall = self.stall, "crosstalk search stalled");
                        self.found = true;
                    }
                }
            }
            _ => {
                self.best = Some(Best {
                    compensation,
                    deviation_mm: deviation,
                });
                self.stall = 0;
                if deviation < self.found_mm {
                    self.found = true;
                }
            }
        }
    }

    /// No further candidates need to be tried.
    pub fn is_found(&self) -> bool {
        self.found
    }

    pub fn best(&self) -> Option<Best> {
        self.best
    }

    pub fn stall_count(&self) -> u32 {
        self.stall
    }

    /// Best compensation if it is good enough to persist.
    pub fn usable(&self) -> Option<u32> {
        self.best
            .filter(|b| b.deviation_mm < self.usable_mm)
            .map(|b| b.compensation)
    }
}

/// Runs the searches. Cheap to clone; clones share the abort flag.
#[derive(Clone)]
pub struct Calibrator {
    store: CalibrationStore,
    params: CalibrationParams,
    profile: SensorProfile,
    clock: Arc<dyn Clock + Send + Sync>,
    abort: Arc<AtomicBool>,
}

impl Calibrator {
    pub fn new(
        store: CalibrationStore,
        params: CalibrationParams,
        profile: SensorProfile,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            store,
            params,
            profile,
            clock,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The cooperative abort flag observed by both searches.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn clear_abort(&self) {
        self.abort.store(false, Ordering::Release);
    }

    /// Take up to `readings_per_candidate` samples, pausing between them.
    /// Read errors are skipped. Stops early when the abort flag is set.
    fn sample(&self, sensor: &mut dyn RangingSensor, mut each: impl FnMut(&Measurement)) {
        for _ in 0..self.params.readings_per_candidate {
            if self.aborted() {
                return;
            }
            match sensor.get_measurement() {
                Ok(m) => each(&m),
                Err(e) => debug!(error = %map_hw_error(&*e), "reading skipped"),
            }
            self.clock.sleep(self.params.read_interval);
        }
    }

    fn stop_sensor(sensor: &mut dyn RangingSensor) {
        if let Err(e) = sensor.deinit() {
            warn!(error = %map_hw_error(&*e), "sensor deinit failed");
        }
    }

    fn bring_up(
        &self,
        sensor: &mut dyn RangingSensor,
        compensation: u32,
        mode: DriverMode,
    ) -> Result<()> {
        let params = InitParams {
            compensation,
            mode,
            profile: self.profile,
        };
        sensor.init(&params).map_err(|e| {
            let err = map_init_error(&*e);
            error!(compensation, error = %err, "sensor init failed");
            eyre::Report::new(err)
        })
    }

    /// Sweep compensation candidates for the one that makes the sensor read
    /// `target_mm` most closely, and persist it.
    pub fn run_crosstalk_search(
        &self,
        sensor: &mut dyn RangingSensor,
    ) -> Result<SearchOutcome<u32>> {
        Self::stop_sensor(sensor);
        let mut search = CrosstalkSearch::new(&self.params);

        for compensation in self.params.candidates() {
            if self.aborted() || search.is_found() {
                break;
            }
            self.bring_up(sensor, compensation, DriverMode::Calibration)?;
            self.sample(sensor, |m| {
                search.observe(compensation, m.range_mm);
                debug!(
                    compensation,
                    range_mm = m.range_mm,
                    best = ?search.best(),
                    "crosstalk reading"
                );
            });
            Self::stop_sensor(sensor);
            self.clock.sleep(self.params.read_interval);
        }

        if !self.aborted()
            && let Some(best) = search.usable()
        {
            self.store.save(Field::CrosstalkCompensation(best));
            info!(compensation = best, deviation_mm = ?search.best().map(|b| b.deviation_mm), "crosstalk calibrated");
            return Ok(SearchOutcome::Saved(best));
        }

        warn!(aborted = self.aborted(), best = ?search.best(), "crosstalk search gave no usable value");
        self.clear_abort();
        Ok(SearchOutcome::Warning)
    }

    /// Measure the best signal/ambient ratio at the far-field position with
    /// the stored compensation applied, and persist it.
    pub fn run_sensitivity_search(
        &self,
        sensor: &mut dyn RangingSensor,
    ) -> Result<SearchOutcome<f32>> {
        Self::stop_sensor(sensor);
        let compensation = self.store.load().crosstalk_compensation;
        self.bring_up(sensor, compensation, DriverMode::Ranging)?;

        let mut best = 0.0f32;
        let mut valid = 0u32;
        self.sample(sensor, |m| {
            let ratio = signal_ambient_ratio(m);
            if !ratio.is_finite() {
                debug!(signal = m.signal_rate, ambient = m.ambient_rate, "non-finite ratio ignored");
                return;
            }
            valid += 1;
            debug!(ratio, "sensitivity reading");
            if ratio > best {
                best = ratio;
            }
        });

        if !self.aborted() {
            if valid == 0 {
                warn!("no valid sensitivity reading; persisting 0");
            }
            self.store.save(Field::SensitivityRatio(best));
            info!(sensitivity = best, "sensitivity calibrated");
            return Ok(SearchOutcome::Saved(best));
        }

        warn!("sensitivity search aborted");
        self.clear_abort();
        Ok(SearchOutcome::Warning)
    }

    /// Run the search for `mode` and fold the outcome into a result value.
    pub fn run(&self, mode: RunMode, sensor: &mut dyn RangingSensor) -> AlgorithmResult {
        info!(?mode, "calibration run started");
        let res = match mode {
            RunMode::NearField => self.run_crosstalk_search(sensor).map(|o| {
                matches!(o, SearchOutcome::Saved(_))
            }),
            RunMode::FarField => self
                .run_sensitivity_search(sensor)
                .map(|o| matches!(o, SearchOutcome::Saved(_))),
        };
        match res {
            Ok(true) => AlgorithmResult::Succeeded(mode),
            Ok(false) => AlgorithmResult::Failed(mode, FailureKind::Warning),
            Err(e) => {
                error!(?mode, error = %e, "calibration run failed");
                AlgorithmResult::Failed(mode, FailureKind::Driver(e.to_string()))
            }
        }
    }
}
