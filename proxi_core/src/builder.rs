//! Builder for `Proxi`, the context object tying the subsystem together.
//!
//! There are no globals: the sensor session, the store, the page index, the
//! display guard and the worker link all live here and are handed out to
//! the two page loops.

use std::sync::Arc;

use proxi_traits::{
    Clock, DisplaySurface, KvStore, Lifecycle, MonotonicClock, RangingSensor, SensorProfile,
};

use crate::calibration::Calibrator;
use crate::config::{CalibrationParams, PresenceCfg, WizardCfg};
use crate::conversions::{sensor_profile, store_layout};
use crate::error::{BuildError, Result};
use crate::filter::{FilterSettings, Policy};
use crate::input::{Button, TapReceiver, TapSender, tap_channel};
use crate::link::CalibrationLink;
use crate::pages::{Page, Pages};
use crate::presence::PresenceLoop;
use crate::session::SensorSession;
use crate::store::CalibrationStore;
use crate::ui::Gui;
use crate::wizard::{self, WizardRunner};
use crate::worker::CalibrationWorker;

pub struct Proxi {
    clock: Arc<dyn Clock + Send + Sync>,
    session: SensorSession,
    store: CalibrationStore,
    gui: Gui,
    pages: Pages,
    lifecycle: Arc<dyn Lifecycle + Send + Sync>,
    worker: CalibrationWorker,
    wizard_cfg: WizardCfg,
    presence_cfg: PresenceCfg,
    policy_kind: proxi_config::FilterPolicy,
    filter: FilterSettings,
    profile: SensorProfile,
    primary: (TapSender, TapReceiver),
    secondary: (TapSender, TapReceiver),
}

impl core::fmt::Debug for Proxi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Proxi")
            .field("page", &self.pages.current())
            .field("store", &self.store)
            .field("policy", &self.policy_kind)
            .finish_non_exhaustive()
    }
}

impl Proxi {
    pub fn builder() -> ProxiBuilder {
        ProxiBuilder::default()
    }

    pub fn pages(&self) -> Pages {
        self.pages.clone()
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn link(&self) -> CalibrationLink {
        self.worker.link()
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// The primary (CALIBRATE/STOP) button, gated by the long-press time.
    pub fn primary_button(&self) -> Button {
        Button::new(self.wizard_cfg.long_press, self.primary.0.clone())
    }

    /// The secondary button: factory reset while on the calibration page.
    pub fn secondary_button(&self) -> Button {
        Button::new(self.wizard_cfg.long_press, self.secondary.0.clone())
    }

    /// The filter policy as configured, against the committed record.
    pub fn current_policy(&self) -> Policy {
        Policy::select(self.policy_kind, &self.filter, &self.store.load())
    }

    pub fn calibration_wizard(&self) -> WizardRunner {
        WizardRunner {
            clock: Arc::clone(&self.clock),
            pages: self.pages.clone(),
            gui: self.gui.clone(),
            link: self.worker.link(),
            session: self.session.clone(),
            store: self.store.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            taps: self.primary.1.clone(),
            reset_taps: Some(self.secondary.1.clone()),
            cfg: self.wizard_cfg.clone(),
            observer: None,
        }
    }

    pub fn presence_loop(&self) -> PresenceLoop {
        PresenceLoop {
            clock: Arc::clone(&self.clock),
            pages: self.pages.clone(),
            gui: self.gui.clone(),
            session: self.session.clone(),
            store: self.store.clone(),
            policy: self.current_policy(),
            profile: self.profile,
            taps: self.primary.1.clone(),
            cfg: self.presence_cfg.clone(),
            max_polls: None,
            observer: None,
        }
    }

    /// Abort any run, erase the store once the sensor is released, and
    /// restart.
    pub fn factory_reset(&self) -> Result<()> {
        wizard::stop_and_reset(
            &self.worker.link(),
            &self.session,
            &self.store,
            self.lifecycle.as_ref(),
        )
    }
}

pub struct ProxiBuilder {
    cfg: proxi_config::Config,
    sensor: Option<Box<dyn RangingSensor + Send>>,
    kv: Option<Box<dyn KvStore + Send>>,
    display: Option<Box<dyn DisplaySurface + Send>>,
    lifecycle: Option<Arc<dyn Lifecycle + Send + Sync>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    initial_page: Page,
    policy_override: Option<proxi_config::FilterPolicy>,
}

impl Default for ProxiBuilder {
    fn default() -> Self {
        Self {
            cfg: proxi_config::Config::default(),
            sensor: None,
            kv: None,
            display: None,
            lifecycle: None,
            clock: None,
            initial_page: Page::PresenceTest,
            policy_override: None,
        }
    }
}

impl ProxiBuilder {
    pub fn config(mut self, cfg: &proxi_config::Config) -> Self {
        self.cfg = cfg.clone();
        self
    }

    pub fn sensor(mut self, s: impl RangingSensor + Send + 'static) -> Self {
        self.sensor = Some(Box::new(s));
        self
    }

    pub fn kv_store(mut self, kv: impl KvStore + Send + 'static) -> Self {
        self.kv = Some(Box::new(kv));
        self
    }

    pub fn display(mut self, d: impl DisplaySurface + Send + 'static) -> Self {
        self.display = Some(Box::new(d));
        self
    }

    pub fn lifecycle(mut self, l: impl Lifecycle + Send + Sync + 'static) -> Self {
        self.lifecycle = Some(Arc::new(l));
        self
    }

    pub fn clock(mut self, c: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(c);
        self
    }

    pub fn initial_page(mut self, page: Page) -> Self {
        self.initial_page = page;
        self
    }

    /// Presence-page policy, overriding the configuration.
    pub fn presence_policy(mut self, p: proxi_config::FilterPolicy) -> Self {
        self.policy_override = Some(p);
        self
    }

    pub fn try_build(self) -> Result<Proxi> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let kv = self
            .kv
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let display = self
            .display
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDisplay))?;
        let lifecycle = self
            .lifecycle
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLifecycle))?;
        self.cfg.validate()?;

        let params = CalibrationParams::from(&self.cfg.calibration);
        if params.candidates().next().is_none() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "calibration candidate range is empty",
            )));
        }
        let wizard_cfg = WizardCfg::from(&self.cfg.wizard);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let profile = sensor_profile(&self.cfg.sensor);

        let session = SensorSession::from_boxed(sensor);
        let store = CalibrationStore::from_boxed(kv, store_layout(&self.cfg));
        let gui = Gui::from_boxed(display, Arc::clone(&clock), wizard_cfg.gui_lock_timeout);
        let calibrator = Calibrator::new(store.clone(), params, profile, Arc::clone(&clock));
        let worker = CalibrationWorker::spawn(session.clone(), calibrator);

        tracing::debug!(page = ?self.initial_page, "proximity subsystem built");
        Ok(Proxi {
            clock,
            session,
            store,
            gui,
            pages: Pages::new(self.initial_page),
            lifecycle,
            worker,
            wizard_cfg,
            presence_cfg: PresenceCfg::from(&self.cfg.presence),
            policy_kind: self
                .policy_override
                .unwrap_or_else(|| self.cfg.presence_policy()),
            filter: FilterSettings::from(&self.cfg.filter),
            profile,
            primary: tap_channel(),
            secondary: tap_channel(),
        })
    }
}
