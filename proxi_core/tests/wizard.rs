use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxi_core::mocks::{FailingStore, RecordingDisplay, RestartRecorder, ScriptedSensor};
use proxi_core::ui::{CALIBRATION_TITLE, startup_screen};
use proxi_core::{
    CalibrationRecord, Field, Page, Phase, Proxi, RunMode, WizardExit, WizardState,
};
use proxi_hardware::MemoryStore;
use proxi_traits::{Measurement, RangingSensor, SimClock};

struct Rig {
    proxi: Proxi,
    display: RecordingDisplay,
    restarts: RestartRecorder,
    clock: SimClock,
}

fn rig_with(sensor: impl RangingSensor + Send + 'static, cfg: &proxi_config::Config) -> Rig {
    let clock = SimClock::new();
    let display = RecordingDisplay::new();
    let restarts = RestartRecorder::new(Arc::new(clock.clone()));
    let proxi = Proxi::builder()
        .config(cfg)
        .sensor(sensor)
        .kv_store(MemoryStore::new())
        .display(display.clone())
        .lifecycle(restarts.clone())
        .clock(Arc::new(clock.clone()))
        .initial_page(Page::Calibration)
        .try_build()
        .unwrap();
    Rig {
        proxi,
        display,
        restarts,
        clock,
    }
}

fn rig(sensor: impl RangingSensor + Send + 'static) -> Rig {
    rig_with(sensor, &proxi_config::Config::default())
}

type Log = Arc<Mutex<Vec<(WizardState, Duration)>>>;

fn recorder(clock: &SimClock) -> (Log, impl FnMut(&WizardState) + Send + 'static) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let clock = clock.clone();
    (log, move |s: &WizardState| {
        sink.lock().unwrap().push((*s, clock.elapsed()));
    })
}

fn phases(log: &Log) -> Vec<Phase> {
    log.lock().unwrap().iter().map(|(s, _)| s.phase).collect()
}

#[test]
fn entry_draws_start_screen() {
    let r = rig(ScriptedSensor::by_compensation(|_| 600));
    let pages = r.proxi.pages();
    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |_| pages.navigate(Page::Other))
        .run();
    assert_eq!(exit, WizardExit::Left);
    let first = r.display.frames()[0].clone();
    assert_eq!(first.title, CALIBRATION_TITLE);
    assert_eq!(first.body, "Please press\nthe calibration\nbutton below");
    assert_eq!(first.button.as_deref(), Some("CALIBRATE"));
    assert_eq!(r.restarts.count(), 0);
}

#[test]
fn countdown_ticks_once_per_second_then_runs() {
    let r = rig(ScriptedSensor::by_compensation(|_| 2000));
    let (log, mut record) = recorder(&r.clock);
    let pages = r.proxi.pages();
    r.proxi.primary_button().press();

    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |s| {
            record(s);
            if s.phase == Phase::Running {
                pages.navigate(Page::Other);
            }
        })
        .run();

    assert_eq!(exit, WizardExit::Left);
    let log = log.lock().unwrap().clone();
    let countdown: Vec<u8> = log
        .iter()
        .filter(|(s, _)| s.phase == Phase::CountdownNear)
        .map(|(s, _)| s.countdown_remaining)
        .collect();
    assert_eq!(countdown, vec![5, 4, 3, 2, 1]);
    // Start, 5 countdown frames, Running: one second apart from the tap on.
    let times: Vec<u128> = log[1..].iter().map(|(_, t)| t.as_millis()).collect();
    assert_eq!(times, vec![0, 1000, 2000, 3000, 4000, 5000]);
    let running = log.last().unwrap().0;
    assert_eq!(running.phase, Phase::Running);
    assert_eq!(running.countdown_remaining, 0);
    assert_eq!(r.restarts.count(), 0);
}

#[test]
fn tap_during_countdown_fails_and_restarts_once() {
    let r = rig(ScriptedSensor::by_compensation(|_| 600));
    let (log, mut record) = recorder(&r.clock);
    let mut button = r.proxi.primary_button();
    r.proxi.primary_button().press();

    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |s| {
            record(s);
            if s.phase == Phase::CountdownNear && s.countdown_remaining == 3 {
                button.press();
            }
        })
        .run();

    assert_eq!(exit, WizardExit::Failed);
    assert_eq!(phases(&log).last(), Some(&Phase::Failed));
    assert_eq!(r.restarts.count(), 1);
    assert!(r.proxi.link().abort_requested());
    assert_eq!(r.proxi.store().load(), CalibrationRecord::default());
    let last = r.display.last().unwrap();
    assert_eq!(last.body, "Calibration failed\n\nWait for\nreboot");
    assert_eq!(last.button, None);
}

#[test]
fn tap_while_running_aborts_search() {
    // Never converges, so only the tap can end the near run.
    let r = rig(ScriptedSensor::by_compensation(|_| 2000));
    let mut button = r.proxi.primary_button();
    r.proxi.primary_button().press();

    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |s| {
            if s.phase == Phase::Running {
                button.press();
            }
        })
        .run();

    assert_eq!(exit, WizardExit::Failed);
    assert_eq!(r.restarts.count(), 1);
    assert_eq!(r.proxi.store().load().crosstalk_compensation, 50);
}

#[test]
fn driver_failure_ends_in_failed() {
    let mut sensor = ScriptedSensor::by_compensation(|_| 600);
    sensor.fail_init = true;
    let r = rig(sensor);
    let (log, record) = recorder(&r.clock);
    r.proxi.primary_button().press();

    let exit = r.proxi.calibration_wizard().on_phase(record).run();

    assert_eq!(exit, WizardExit::Failed);
    let p = phases(&log);
    assert!(p.contains(&Phase::Running));
    assert_eq!(p.last(), Some(&Phase::Failed));
    assert_eq!(r.restarts.count(), 1);
}

#[test]
fn far_countdown_length_is_configurable() {
    let mut cfg = proxi_config::Config::default();
    cfg.wizard.far_countdown = 8;
    cfg.wizard.near_countdown = 1;
    let r = rig_with(ScriptedSensor::by_compensation(|_| 600), &cfg);
    let (log, mut record) = recorder(&r.clock);
    let pages = r.proxi.pages();
    r.proxi.primary_button().press();

    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |s| {
            record(s);
            if s.phase == Phase::CountdownFar {
                pages.navigate(Page::Other);
            }
        })
        .run();

    assert_eq!(exit, WizardExit::Left);
    let (far, _) = *log.lock().unwrap().last().unwrap();
    assert_eq!(far.phase, Phase::CountdownFar);
    assert_eq!(far.countdown_remaining, 8);
    assert_eq!(r.proxi.store().load().crosstalk_compensation, 25);
    let last = r.display.last().unwrap();
    assert!(last.body.contains("at 100cm"));
    assert_eq!(last.button.as_deref(), Some("STOP"));
}

#[test]
fn secondary_button_factory_resets() {
    let r = rig(ScriptedSensor::by_compensation(|_| 600));
    r.proxi.store().save(Field::CrosstalkCompensation(1400));
    r.proxi.secondary_button().press();

    let exit = r.proxi.calibration_wizard().run();

    assert_eq!(exit, WizardExit::FactoryReset { erased: true });
    assert_eq!(r.proxi.store().load(), CalibrationRecord::default());
    assert_eq!(r.restarts.count(), 1);
}

#[test]
fn failed_erase_is_reported_in_exit() {
    let clock = SimClock::new();
    let restarts = RestartRecorder::new(Arc::new(clock.clone()));
    let proxi = Proxi::builder()
        .sensor(ScriptedSensor::by_compensation(|_| 600))
        .kv_store(FailingStore)
        .display(RecordingDisplay::new())
        .lifecycle(restarts.clone())
        .clock(Arc::new(clock))
        .initial_page(Page::Calibration)
        .try_build()
        .unwrap();
    proxi.secondary_button().press();

    let exit = proxi.calibration_wizard().run();

    assert_eq!(exit, WizardExit::FactoryReset { erased: false });
    // The restart is still requested.
    assert_eq!(restarts.count(), 1);
}

#[test]
fn factory_reset_waits_for_running_search_to_release_sensor() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let sensor = ScriptedSensor::new(move |_, idx| {
        if idx == 0 {
            let _ = entered_tx.send(());
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        }
        Ok(Measurement {
            range_mm: 1200,
            signal_rate: 30 << 16,
            ambient_rate: 1 << 16,
            status: 0,
        })
    });
    let r = rig(sensor);
    let link = r.proxi.link();
    assert!(link.request(RunMode::FarField));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    r.proxi.secondary_button().press();
    let runner = r.proxi.calibration_wizard();
    let reset = std::thread::spawn(move || runner.run());
    std::thread::sleep(Duration::from_millis(50));
    assert!(!reset.is_finished(), "erase ran while the search held the sensor");
    assert!(link.abort_requested());

    release_tx.send(()).unwrap();
    let exit = reset.join().unwrap();

    assert_eq!(exit, WizardExit::FactoryReset { erased: true });
    assert_eq!(r.proxi.store().load(), CalibrationRecord::default());
    assert_eq!(r.restarts.count(), 1);
}

#[test]
fn startup_screen_is_drawn_before_restart_when_enabled() {
    let mut cfg = proxi_config::Config::default();
    cfg.wizard.startup_screen_before_restart = true;
    let mut sensor = ScriptedSensor::by_compensation(|_| 600);
    sensor.fail_init = true;
    let r = rig_with(sensor, &cfg);
    r.proxi.primary_button().press();

    assert_eq!(r.proxi.calibration_wizard().run(), WizardExit::Failed);
    assert_eq!(r.display.last(), Some(startup_screen()));
    assert_eq!(r.restarts.count(), 1);
}

#[test]
fn leaving_page_skips_dwell_and_restart() {
    let r = rig(ScriptedSensor::by_compensation(|_| 600));
    let pages = r.proxi.pages();
    r.proxi.primary_button().press();
    let exit = r
        .proxi
        .calibration_wizard()
        .on_phase(move |s| {
            if s.phase == Phase::CountdownNear && s.countdown_remaining == 4 {
                pages.navigate(Page::PresenceTest);
            }
        })
        .run();
    assert_eq!(exit, WizardExit::Left);
    assert_eq!(r.restarts.count(), 0);
    // Tick at 1000 ms, one more poll, no dwell.
    assert_eq!(r.clock.elapsed().as_millis(), 1200);
}
