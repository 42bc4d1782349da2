use std::sync::{Arc, Mutex};

use proxi_core::mocks::{RecordingDisplay, RestartRecorder, ScriptedSensor};
use proxi_core::{Field, Page, PresenceExit, PresenceReading, Proxi};
use proxi_hardware::MemoryStore;
use proxi_traits::{DriverMode, Measurement, RangingSensor, SimClock};

fn build(
    sensor: impl RangingSensor + Send + 'static,
    policy: proxi_config::FilterPolicy,
) -> (Proxi, RecordingDisplay, SimClock) {
    let clock = SimClock::new();
    let display = RecordingDisplay::new();
    let proxi = Proxi::builder()
        .sensor(sensor)
        .kv_store(MemoryStore::new())
        .display(display.clone())
        .lifecycle(RestartRecorder::new(Arc::new(clock.clone())))
        .clock(Arc::new(clock.clone()))
        .presence_policy(policy)
        .try_build()
        .unwrap();
    (proxi, display, clock)
}

fn script(readings: &'static [(u16, u32, u8)]) -> ScriptedSensor {
    ScriptedSensor::new(move |_, idx| {
        let (range_mm, signal, status) = readings[idx as usize % readings.len()];
        if status == 255 {
            return Err("control interface error".into());
        }
        Ok(Measurement {
            range_mm,
            signal_rate: signal << 16,
            ambient_rate: 1 << 16,
            status,
        })
    })
}

#[test]
fn readings_map_to_page_text() {
    let sensor = script(&[
        (150, 60, 0),
        (350, 60, 0),
        (550, 60, 0),
        (700, 60, 0),
        (300, 10, 0),
        (300, 60, 4),
        (0, 0, 255),
    ]);
    let (proxi, display, clock) = build(sensor, proxi_config::FilterPolicy::Ratio);
    let seen: Arc<Mutex<Vec<PresenceReading>>> = Arc::default();
    let sink = Arc::clone(&seen);

    let exit = proxi
        .presence_loop()
        .max_polls(7)
        .on_reading(move |r| sink.lock().unwrap().push(r))
        .run();

    assert_eq!(exit, PresenceExit::Polled(7));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            PresenceReading::Detected(150),
            PresenceReading::Detected(350),
            PresenceReading::Detected(550),
            PresenceReading::Detected(700),
            PresenceReading::NoReading,
            PresenceReading::NoReading,
            PresenceReading::Error,
        ]
    );
    let bodies: Vec<String> = display.frames().into_iter().map(|f| f.body).collect();
    assert_eq!(
        bodies,
        vec![
            "NEAR\nDist: 150",
            "MEDIUM\nDist: 350",
            "FAR\nDist: 550",
            "NO PROXY",
            "NO READING",
            "NO READING",
            "ERROR",
        ]
    );
    // Six sleeps between seven polls.
    assert_eq!(clock.elapsed().as_millis(), 1200);
}

#[test]
fn ranging_starts_with_stored_compensation() {
    let sensor = script(&[(150, 60, 0)]);
    let inits = Arc::clone(&sensor.inits);
    let (proxi, _, _) = build(sensor, proxi_config::FilterPolicy::Ratio);
    proxi.store().save(Field::CrosstalkCompensation(1350));

    proxi.presence_loop().max_polls(1).run();

    let inits = inits.lock().unwrap();
    assert_eq!(inits[0].compensation, 1350);
    assert_eq!(inits[0].mode, DriverMode::Ranging);
}

#[test]
fn tiered_policy_ignores_calibration() {
    // 1 MCps * 600 mm is above HIGH but under MED.
    let sensor = script(&[(600, 1, 0)]);
    let (proxi, _, _) = build(sensor, proxi_config::FilterPolicy::Tiered);
    let seen: Arc<Mutex<Vec<PresenceReading>>> = Arc::default();
    let sink = Arc::clone(&seen);
    proxi
        .presence_loop()
        .max_polls(1)
        .on_reading(move |r| sink.lock().unwrap().push(r))
        .run();
    // Default level is MED.
    assert_eq!(*seen.lock().unwrap(), vec![PresenceReading::NoReading]);
}

#[test]
fn exits_when_page_changes() {
    let (proxi, _, _) = build(script(&[(150, 60, 0)]), proxi_config::FilterPolicy::Ratio);
    let pages = proxi.pages();
    let exit = proxi
        .presence_loop()
        .on_reading(move |_| pages.navigate(Page::Other))
        .run();
    assert_eq!(exit, PresenceExit::Left);
}

#[test]
fn tap_navigates_to_calibration() {
    let (proxi, display, _) = build(script(&[(150, 60, 0)]), proxi_config::FilterPolicy::Ratio);
    proxi.primary_button().press();
    assert_eq!(proxi.presence_loop().run(), PresenceExit::Calibrate);
    assert!(proxi.pages().is(Page::Calibration));
    let frame = display.last().unwrap();
    assert_eq!(frame.title, "PROXY TEST");
    assert_eq!(frame.button.as_deref(), Some("CALIBRATE"));
}
