use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Time source for the page loops, the countdown scheduler and sensor
/// pacing. Everything that waits goes through `sleep`, so a virtual clock
/// can stand in for real time.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Whole milliseconds from `epoch` to now; 0 if `epoch` is in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock time: `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Virtual clock whose time only moves when someone sleeps on it.
///
/// now() = origin + offset
/// sleep(d) advances the shared offset by d and yields instead of blocking.
/// Clones share the same timeline, so a polling loop and a worker thread
/// observe one consistent virtual time.
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_advances_only_on_sleep() {
        let clock = SimClock::new();
        let epoch = clock.now();
        assert_eq!(clock.ms_since(epoch), 0);
        clock.sleep(Duration::from_millis(200));
        clock.sleep(Duration::from_millis(800));
        assert_eq!(clock.ms_since(epoch), 1000);
    }

    #[test]
    fn sim_clock_clones_share_timeline() {
        let a = SimClock::new();
        let b = a.clone();
        b.advance(Duration::from_millis(20));
        assert_eq!(a.elapsed(), Duration::from_millis(20));
    }
}
