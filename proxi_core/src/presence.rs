//! Live presence readout for the proximity test page.

use std::ops::ControlFlow;
use std::sync::Arc;

use proxi_traits::{Clock, DriverMode, InitParams, RangingSensor, SensorProfile};
use tracing::{debug, error};

use crate::config::PresenceCfg;
use crate::filter::{Policy, detect};
use crate::hw_error::{map_hw_error, map_init_error};
use crate::input::TapReceiver;
use crate::pages::{Page, Pages};
use crate::scheduler::run_every;
use crate::session::SensorSession;
use crate::store::CalibrationStore;
use crate::ui::{Gui, presence_screen};

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceReading {
    /// The driver failed or the sensor was busy.
    Error,
    /// Sample rejected by the filter.
    NoReading,
    /// Accepted sample; range in mm.
    Detected(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceExit {
    /// Page changed elsewhere.
    Left,
    /// Tap on the page; the calibration page is now current.
    Calibrate,
    /// Poll budget used up.
    Polled(u64),
}

pub type ReadingObserver = Box<dyn FnMut(PresenceReading) + Send>;

pub struct PresenceLoop {
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) pages: Pages,
    pub(crate) gui: Gui,
    pub(crate) session: SensorSession,
    pub(crate) store: CalibrationStore,
    pub(crate) policy: Policy,
    pub(crate) profile: SensorProfile,
    pub(crate) taps: TapReceiver,
    pub(crate) cfg: PresenceCfg,
    pub(crate) max_polls: Option<u64>,
    pub(crate) observer: Option<ReadingObserver>,
}

impl PresenceLoop {
    /// Stop after `n` polls instead of running until the page changes.
    pub fn max_polls(mut self, n: u64) -> Self {
        self.max_polls = Some(n);
        self
    }

    pub fn on_reading(mut self, f: impl FnMut(PresenceReading) + Send + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Put the sensor into continuous ranging with the stored compensation.
    fn bring_up(&self) {
        let compensation = self.store.load().crosstalk_compensation;
        let mut sensor = self.session.lease();
        if let Err(e) = sensor.deinit() {
            debug!(error = %map_hw_error(&*e), "deinit before ranging failed");
        }
        let params = InitParams {
            compensation,
            mode: DriverMode::Ranging,
            profile: self.profile,
        };
        if let Err(e) = sensor.init(&params) {
            error!(error = %map_init_error(&*e), "sensor bring-up failed");
        }
    }

    /// One reading through the filter.
    pub fn read_once(&self) -> PresenceReading {
        let Some(mut sensor) = self.session.try_lease_for(self.cfg.poll, self.clock.as_ref())
        else {
            debug!("sensor busy");
            return PresenceReading::Error;
        };
        match sensor.get_measurement() {
            Ok(m) => match detect(&m, &self.policy) {
                Some(mm) => PresenceReading::Detected(mm),
                None => PresenceReading::NoReading,
            },
            Err(e) => {
                debug!(error = %map_hw_error(&*e), "presence read failed");
                PresenceReading::Error
            }
        }
    }

    pub fn run(mut self) -> PresenceExit {
        self.bring_up();
        let clock = Arc::clone(&self.clock);
        let period = self.cfg.poll;
        let mut polls = 0u64;
        run_every(clock.as_ref(), period, || {
            if !self.pages.is(Page::PresenceTest) {
                return ControlFlow::Break(PresenceExit::Left);
            }
            let reading = self.read_once();
            self.gui.draw(&presence_screen(reading));
            if let Some(obs) = self.observer.as_mut() {
                obs(reading);
            }
            polls += 1;
            if self.taps.take() {
                self.pages.navigate(Page::Calibration);
                return ControlFlow::Break(PresenceExit::Calibrate);
            }
            if self.max_polls.is_some_and(|n| polls >= n) {
                return ControlFlow::Break(PresenceExit::Polled(polls));
            }
            ControlFlow::Continue(())
        })
    }
}
