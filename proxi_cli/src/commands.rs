//! Command runners. Each one assembles the subsystem on top of the
//! simulated sensor and the file store, runs a page loop, and reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use proxi_core::conversions::sensor_profile;
use proxi_core::hw_error::{map_hw_error, map_init_error};
use proxi_core::{
    AlgorithmResult, Button, FailureKind, Page, Phase, PresenceExit, PresenceReading, Proxi, ProxiError,
    WizardExit, factory_reset,
};
use proxi_traits::{Clock, DriverMode, InitParams, MonotonicClock, RangingSensor, SimClock};
use serde_json::json;

use crate::host::{ConsoleDisplay, SimLifecycle, open_calibration_store, open_file_store, sim_sensor};

fn clock(virtual_time: bool) -> Arc<dyn Clock + Send + Sync> {
    if virtual_time {
        Arc::new(SimClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    }
}

/// Ctrl-C leaves whatever page is current, which ends its loop.
fn leave_on_interrupt(proxi: &Proxi) {
    let pages = proxi.pages();
    if let Err(e) = ctrlc::set_handler(move || pages.navigate(Page::Other)) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }
}

fn build(
    cfg: &proxi_config::Config,
    json: bool,
    clock: Arc<dyn Clock + Send + Sync>,
    page: Page,
    policy: Option<proxi_config::FilterPolicy>,
) -> eyre::Result<(Proxi, SimLifecycle, proxi_hardware::SimControl)> {
    let sensor = sim_sensor(cfg, Arc::clone(&clock));
    let control = sensor.control();
    let lifecycle = SimLifecycle::default();
    let mut builder = Proxi::builder()
        .config(cfg)
        .sensor(sensor)
        .kv_store(open_file_store(cfg)?)
        .display(ConsoleDisplay { json })
        .lifecycle(lifecycle.clone())
        .clock(clock)
        .initial_page(page);
    if let Some(p) = policy {
        builder = builder.presence_policy(p);
    }
    Ok((builder.try_build()?, lifecycle, control))
}

/// Presses STOP once a clock deadline has passed. Polled from the wizard's
/// phase observer, which is deterministic on a virtual clock, and from a
/// side thread for deadlines that fall inside a running search.
#[derive(Clone)]
struct Canceller {
    clock: Arc<dyn Clock + Send + Sync>,
    start: Instant,
    deadline_ms: u64,
    stop: Button,
    fired: Arc<AtomicBool>,
}

impl Canceller {
    fn new(proxi: &Proxi, deadline_ms: u64) -> Self {
        let clock = proxi.clock();
        Self {
            start: clock.now(),
            clock,
            deadline_ms,
            stop: proxi.primary_button(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once the deadline has passed (and STOP was pressed).
    fn poll(&mut self) -> bool {
        if self.fired.load(Ordering::Acquire) {
            return true;
        }
        if self.clock.ms_since(self.start) < self.deadline_ms {
            return false;
        }
        if !self.fired.swap(true, Ordering::AcqRel) {
            tracing::info!(after_ms = self.deadline_ms, "cancelling calibration");
            self.stop.press();
        }
        true
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn spawn(mut self, done: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("proxi-cancel".into())
            .spawn(move || {
                while !done.load(Ordering::Acquire) && !self.poll() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
    }
}

fn failure_error(status: &AlgorithmResult) -> ProxiError {
    match status {
        AlgorithmResult::Failed(_, FailureKind::Driver(msg)) => ProxiError::Driver(msg.clone()),
        _ => ProxiError::CalibrationWarning,
    }
}

pub fn run_calibrate(
    cfg: &proxi_config::Config,
    json: bool,
    virtual_time: bool,
    cancel_after_ms: Option<u64>,
) -> eyre::Result<()> {
    let (proxi, lifecycle, control) =
        build(cfg, json, clock(virtual_time), Page::Calibration, None)?;
    leave_on_interrupt(&proxi);

    let done = Arc::new(AtomicBool::new(false));
    let canceller = cancel_after_ms.map(|ms| Canceller::new(&proxi, ms));
    let handle = match canceller.clone() {
        Some(c) => Some(c.spawn(Arc::clone(&done)).wrap_err("spawn cancel thread")?),
        None => None,
    };

    // The user taps CALIBRATE on the start screen.
    proxi.primary_button().press();

    let far_mm = cfg.simulator.far_distance_mm;
    let mut on_transition = canceller.clone();
    let exit = proxi
        .calibration_wizard()
        .on_phase(move |state| {
            // The user steps back before the far-field run.
            if state.phase == Phase::CountdownFar && state.countdown_remaining > 0 {
                control.set_distance(far_mm);
            }
            if let Some(c) = on_transition.as_mut() {
                c.poll();
            }
        })
        .run();

    done.store(true, Ordering::Release);
    if let Some(h) = handle
        && h.join().is_err()
    {
        tracing::warn!("cancel thread panicked");
    }
    let cancelled = canceller.as_ref().is_some_and(Canceller::fired);

    let record = proxi.store().load();
    let status = proxi.link().status();
    let outcome = match exit {
        WizardExit::Completed => "completed",
        WizardExit::Failed if cancelled => "cancelled",
        WizardExit::Failed => "failed",
        WizardExit::Left => "left",
        WizardExit::FactoryReset { erased: true } => "factory-reset",
        WizardExit::FactoryReset { erased: false } => "factory-reset-failed",
    };
    tracing::info!(outcome, ?status, restarts = lifecycle.restarts(), "calibration finished");

    if json {
        println!(
            "{}",
            json!({
                "outcome": outcome,
                "crosstalk_compensation": record.crosstalk_compensation,
                "sensitivity_ratio": record.sensitivity_ratio,
                "restarts": lifecycle.restarts(),
            })
        );
    } else {
        println!(
            "calibration {outcome}: crosstalk_compensation={} sensitivity_ratio={:.2} restarts={}",
            record.crosstalk_compensation,
            record.sensitivity_ratio,
            lifecycle.restarts()
        );
    }

    match exit {
        WizardExit::Failed if !cancelled => {
            return Err(eyre::Report::new(failure_error(&status)));
        }
        WizardExit::FactoryReset { erased: false } => {
            return Err(eyre::Report::new(ProxiError::Store(
                "factory reset could not erase the calibration store".into(),
            )));
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
struct PresenceTally {
    detected: u64,
    no_reading: u64,
    errors: u64,
    nearest_mm: Option<u16>,
}

impl PresenceTally {
    fn add(&mut self, r: PresenceReading) {
        match r {
            PresenceReading::Detected(mm) => {
                self.detected += 1;
                self.nearest_mm = Some(self.nearest_mm.map_or(mm, |n| n.min(mm)));
            }
            PresenceReading::NoReading => self.no_reading += 1,
            PresenceReading::Error => self.errors += 1,
        }
    }
}

pub fn run_presence(
    cfg: &proxi_config::Config,
    json: bool,
    polls: u64,
    policy: Option<proxi_config::FilterPolicy>,
    virtual_time: bool,
) -> eyre::Result<()> {
    if polls == 0 {
        eyre::bail!("--polls must be >= 1");
    }
    let (proxi, _lifecycle, _control) =
        build(cfg, json, clock(virtual_time), Page::PresenceTest, policy)?;
    leave_on_interrupt(&proxi);

    let tally = Arc::new(std::sync::Mutex::new(PresenceTally::default()));
    let sink = Arc::clone(&tally);
    let presence = proxi.presence_loop().max_polls(polls).on_reading(move |r| {
        sink.lock().unwrap_or_else(|p| p.into_inner()).add(r);
    });
    let policy_name = match presence.policy() {
        proxi_core::Policy::Ratio(_) => "ratio",
        proxi_core::Policy::Tiered(_) => "tiered",
    };
    let exit = presence.run();
    let t = *tally.lock().unwrap_or_else(|p| p.into_inner());
    let polled = match exit {
        PresenceExit::Polled(n) => n,
        PresenceExit::Left | PresenceExit::Calibrate => t.detected + t.no_reading + t.errors,
    };

    if json {
        println!(
            "{}",
            json!({
                "policy": policy_name,
                "polls": polled,
                "detected": t.detected,
                "no_reading": t.no_reading,
                "errors": t.errors,
                "nearest_mm": t.nearest_mm,
            })
        );
    } else {
        let nearest = t
            .nearest_mm
            .map_or_else(|| "-".to_string(), |mm| format!("{mm} mm"));
        println!(
            "presence ({policy_name}): polls={polled} detected={} no_reading={} errors={} nearest={nearest}",
            t.detected, t.no_reading, t.errors
        );
    }
    Ok(())
}

pub fn run_show(cfg: &proxi_config::Config, json: bool) -> eyre::Result<()> {
    let store = open_calibration_store(cfg)?;
    let record = store.load();
    if json {
        println!(
            "{}",
            json!({
                "namespace": store.layout().namespace,
                "crosstalk_compensation": record.crosstalk_compensation,
                "sensitivity_ratio": record.sensitivity_ratio,
            })
        );
    } else {
        println!("crosstalk_compensation: {}", record.crosstalk_compensation);
        println!("sensitivity_ratio: {:.2}", record.sensitivity_ratio);
    }
    Ok(())
}

pub fn run_factory_reset(cfg: &proxi_config::Config, json: bool) -> eyre::Result<()> {
    let store = open_calibration_store(cfg)?;
    let lifecycle = SimLifecycle::default();
    factory_reset(&store, &lifecycle)?;
    if json {
        println!("{}", json!({ "erased": true, "restarts": lifecycle.restarts() }));
    } else {
        println!("calibration erased; restart requested");
    }
    Ok(())
}

pub fn run_self_check(cfg: &proxi_config::Config, json: bool) -> eyre::Result<()> {
    let record = open_calibration_store(cfg)?.load();
    let mut sensor = sim_sensor(cfg, clock(false));
    let params = InitParams {
        compensation: record.crosstalk_compensation,
        mode: DriverMode::Ranging,
        profile: sensor_profile(&cfg.sensor),
    };
    sensor
        .init(&params)
        .map_err(|e| eyre::Report::new(map_init_error(&*e)))?;
    let m = sensor
        .get_measurement()
        .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
    if let Err(e) = sensor.deinit() {
        tracing::debug!(error = %map_hw_error(&*e), "deinit after self-check failed");
    }
    tracing::debug!(?m, "self-check reading");

    if json {
        println!(
            "{}",
            json!({ "ok": true, "range_mm": m.range_mm, "status": m.status })
        );
    } else {
        println!("OK (range {} mm, status {})", m.range_mm, m.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_failure_keeps_message() {
        let status = AlgorithmResult::Failed(
            proxi_core::RunMode::NearField,
            FailureKind::Driver("i2c".into()),
        );
        assert_eq!(failure_error(&status), ProxiError::Driver("i2c".into()));
        assert_eq!(
            failure_error(&AlgorithmResult::Idle),
            ProxiError::CalibrationWarning
        );
    }

    #[test]
    fn tally_tracks_nearest_detection() {
        let mut t = PresenceTally::default();
        t.add(PresenceReading::Detected(420));
        t.add(PresenceReading::NoReading);
        t.add(PresenceReading::Detected(310));
        t.add(PresenceReading::Error);
        assert_eq!(t.detected, 2);
        assert_eq!(t.nearest_mm, Some(310));
        assert_eq!((t.no_reading, t.errors), (1, 1));
    }
}
