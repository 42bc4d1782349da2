use std::cell::Cell;
use std::time::Duration;

use proxi_hardware::error::HwError;
use proxi_hardware::util::wait_until_ready;
use proxi_traits::{Clock, SimClock};

#[test]
fn wait_until_ready_success_path() {
    let clock = SimClock::new();
    let epoch = clock.now();
    let polls = Cell::new(0);

    let res = wait_until_ready(
        || {
            polls.set(polls.get() + 1);
            Ok(polls.get() >= 3)
        },
        10,
        Duration::from_millis(5),
        &clock,
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
    // Two misses, each followed by one poll interval.
    assert_eq!(clock.ms_since(epoch), 10);
}

#[test]
fn wait_until_ready_timeout_path() {
    let clock = SimClock::new();

    let err = wait_until_ready(|| Ok(false), 4, Duration::from_millis(1), &clock)
        .expect_err("expected timeout error");

    match err {
        HwError::DataReadyTimeout(4) => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn wait_until_ready_propagates_probe_error() {
    let clock = SimClock::new();
    let err = wait_until_ready(
        || Err(HwError::ControlInterface("nack".into())),
        4,
        Duration::from_millis(1),
        &clock,
    )
    .expect_err("probe error ends the wait");
    assert_eq!(err.code(), -20);
}
