//! Clock-driven periodic execution.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use proxi_traits::Clock;

/// Fires once per `period`, measured from the last time it fired or was
/// reset.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    period: Duration,
    last: Instant,
}

impl Interval {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, last: now }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    /// True once at least `period` has passed; re-arms from `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.period {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Call `body` every `period` until it breaks, sleeping on `clock` in
/// between.
pub fn run_every<C, B>(clock: &C, period: Duration, mut body: impl FnMut() -> ControlFlow<B>) -> B
where
    C: Clock + ?Sized,
{
    loop {
        if let ControlFlow::Break(b) = body() {
            return b;
        }
        clock.sleep(period);
    }
}
