//! Serialized drawing and the text content of both proximity pages.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use proxi_traits::{Clock, DisplaySurface, Screen};
use tracing::warn;

use crate::filter::DistanceTier;
use crate::presence::PresenceReading;
use crate::store::CalibrationRecord;
use crate::wizard::{Phase, WizardState};

pub const CALIBRATION_TITLE: &str = "CALIBRATION";
pub const PRESENCE_TITLE: &str = "PROXY TEST";
pub const CALIBRATE_LABEL: &str = "CALIBRATE";
pub const STOP_LABEL: &str = "STOP";

/// Guard held while drawing. Released on drop, on every path.
pub type GuiGuard<'a> = MutexGuard<'a, Box<dyn DisplaySurface + Send>>;

/// Display surface behind a mutex with a bounded acquire.
#[derive(Clone)]
pub struct Gui {
    surface: Arc<Mutex<Box<dyn DisplaySurface + Send>>>,
    clock: Arc<dyn Clock + Send + Sync>,
    lock_timeout: Duration,
}

impl Gui {
    pub fn new(
        surface: impl DisplaySurface + Send + 'static,
        clock: Arc<dyn Clock + Send + Sync>,
        lock_timeout: Duration,
    ) -> Self {
        Self::from_boxed(Box::new(surface), clock, lock_timeout)
    }

    pub fn from_boxed(
        surface: Box<dyn DisplaySurface + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            surface: Arc::new(Mutex::new(surface)),
            clock,
            lock_timeout,
        }
    }

    /// Wait up to the configured timeout for the display.
    pub fn acquire(&self) -> Option<GuiGuard<'_>> {
        let start = self.clock.now();
        loop {
            match self.surface.try_lock() {
                Ok(g) => return Some(g),
                Err(TryLockError::Poisoned(p)) => return Some(p.into_inner()),
                Err(TryLockError::WouldBlock) => {}
            }
            if self.clock.now().saturating_duration_since(start) >= self.lock_timeout {
                return None;
            }
            self.clock.sleep(Duration::from_millis(1));
        }
    }

    /// Draw `screen`, or skip it with a warning if the display stays busy.
    /// Returns whether the frame was rendered.
    pub fn draw(&self, screen: &Screen) -> bool {
        let Some(mut surface) = self.acquire() else {
            warn!(title = %screen.title, "display busy; frame skipped");
            return false;
        };
        match surface.render(screen) {
            Ok(()) => true,
            Err(e) => {
                warn!(title = %screen.title, error = %e, "render failed");
                false
            }
        }
    }
}

/// Content of the calibration page. `record` is only consulted in `Done`.
pub fn wizard_screen(state: &WizardState, record: &CalibrationRecord) -> Screen {
    let n = state.countdown_remaining;
    let body = match state.phase {
        Phase::Start => "Please press\nthe calibration\nbutton below".to_string(),
        Phase::CountdownNear => format!(
            "Stand still\nat 60cm\nfrom the device\n\nCalibration will\nstart in {n}"
        ),
        Phase::CountdownFar => format!(
            "Stand still\nat 100cm\nfrom the device\n\nCalibration will\nstart in {n}"
        ),
        Phase::Running => "Device is\ncalibrating\n\nPlease stand\nstill".to_string(),
        Phase::RunningFar => "Device is\ncalibrating\n\nPlease wait".to_string(),
        Phase::Done => format!(
            "Calibration\ncompleted\n\nXTALK: {}\nSENS: {:.3}\n\nWait for\nreboot",
            record.crosstalk_compensation, record.sensitivity_ratio
        ),
        Phase::Failed => "Calibration failed\n\nWait for\nreboot".to_string(),
    };
    let button = match state.phase {
        Phase::Start => Some(CALIBRATE_LABEL.to_string()),
        p if p.is_terminal() => None,
        _ => Some(STOP_LABEL.to_string()),
    };
    Screen {
        title: CALIBRATION_TITLE.to_string(),
        body,
        button,
    }
}

pub fn presence_screen(reading: PresenceReading) -> Screen {
    let body = match reading {
        PresenceReading::Error => "ERROR".to_string(),
        PresenceReading::NoReading => "NO READING".to_string(),
        PresenceReading::Detected(mm) => match DistanceTier::of(mm) {
            DistanceTier::NoProxy => DistanceTier::NoProxy.label().to_string(),
            tier => format!("{}\nDist: {mm}", tier.label()),
        },
    };
    Screen {
        title: PRESENCE_TITLE.to_string(),
        body,
        button: Some(CALIBRATE_LABEL.to_string()),
    }
}

/// Neutral screen shown right before a restart.
pub fn startup_screen() -> Screen {
    Screen {
        title: String::new(),
        body: "Starting".to_string(),
        button: None,
    }
}
