//! Guided two-stage calibration flow.
//!
//! `Wizard` is the pure state machine: it reacts to taps, countdown ticks
//! and algorithm results, and tells the caller which side effect to
//! perform. `WizardRunner` drives it on the page's polling loop.

use std::sync::Arc;

use proxi_traits::{Clock, Lifecycle};
use tracing::{debug, error, info, warn};

use crate::config::WizardCfg;
use crate::error::{ProxiError, Result};
use crate::input::TapReceiver;
use crate::link::{AlgorithmResult, CalibrationLink, RunMode};
use crate::pages::{Page, Pages};
use crate::scheduler::Interval;
use crate::session::SensorSession;
use crate::store::CalibrationStore;
use crate::ui::{Gui, startup_screen, wizard_screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    CountdownNear,
    Running,
    CountdownFar,
    RunningFar,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    pub fn is_countdown(self) -> bool {
        matches!(self, Phase::CountdownNear | Phase::CountdownFar)
    }

    /// Search expected to be running in this phase.
    pub fn run_mode(self) -> Option<RunMode> {
        match self {
            Phase::Running => Some(RunMode::NearField),
            Phase::RunningFar => Some(RunMode::FarField),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardState {
    pub phase: Phase,
    /// Non-zero only in countdown phases.
    pub countdown_remaining: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StartAlgorithm(RunMode),
    AbortAlgorithm,
}

/// What a transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Step {
    pub changed: bool,
    pub effect: Option<Effect>,
}

impl Step {
    const NONE: Step = Step {
        changed: false,
        effect: None,
    };

    fn changed() -> Self {
        Step {
            changed: true,
            effect: None,
        }
    }

    fn with(effect: Effect) -> Self {
        Step {
            changed: true,
            effect: Some(effect),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wizard {
    state: WizardState,
    near_countdown: u8,
    far_countdown: u8,
}

impl Wizard {
    pub fn new(near_countdown: u8, far_countdown: u8) -> Self {
        Self {
            state: WizardState {
                phase: Phase::Start,
                countdown_remaining: 0,
            },
            near_countdown: near_countdown.max(1),
            far_countdown: far_countdown.max(1),
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    fn enter(&mut self, phase: Phase, countdown: u8) {
        info!(from = ?self.state.phase, to = ?phase, countdown, "wizard transition");
        self.state = WizardState {
            phase,
            countdown_remaining: countdown,
        };
    }

    /// Primary button. Starts the flow from `Start`, aborts it anywhere else.
    pub fn tap(&mut self) -> Step {
        match self.state.phase {
            Phase::Start => {
                self.enter(Phase::CountdownNear, self.near_countdown);
                Step::changed()
            }
            p if p.is_terminal() => Step::NONE,
            _ => {
                self.enter(Phase::Failed, 0);
                Step::with(Effect::AbortAlgorithm)
            }
        }
    }

    /// One countdown interval elapsed. Ignored outside countdown phases.
    pub fn tick(&mut self) -> Step {
        let next = match self.state.phase {
            Phase::CountdownNear => Phase::Running,
            Phase::CountdownFar => Phase::RunningFar,
            _ => return Step::NONE,
        };
        if self.state.countdown_remaining <= 1 {
            self.enter(next, 0);
            match next.run_mode() {
                Some(mode) => Step::with(Effect::StartAlgorithm(mode)),
                None => Step::changed(),
            }
        } else {
            self.state.countdown_remaining -= 1;
            Step::changed()
        }
    }

    /// Fold the latest algorithm result in. Only running phases react.
    pub fn observe(&mut self, result: &AlgorithmResult) -> Step {
        let Some(expected) = self.state.phase.run_mode() else {
            return Step::NONE;
        };
        match result {
            AlgorithmResult::Running(m) if *m == expected => Step::NONE,
            AlgorithmResult::Succeeded(m) if *m == expected => {
                match expected {
                    RunMode::NearField => self.enter(Phase::CountdownFar, self.far_countdown),
                    RunMode::FarField => self.enter(Phase::Done, 0),
                }
                Step::changed()
            }
            AlgorithmResult::Failed(m, kind) if *m == expected => {
                warn!(?m, ?kind, "calibration run failed");
                self.enter(Phase::Failed, 0);
                Step::changed()
            }
            other => {
                let err = ProxiError::UnexpectedResult(format!(
                    "{other:?} while expecting {expected:?}"
                ));
                error!(error = %err, "wizard failing");
                self.enter(Phase::Failed, 0);
                Step::changed()
            }
        }
    }
}

/// Why the wizard loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardExit {
    /// Both searches succeeded; restart requested.
    Completed,
    /// Terminal failure; restart requested.
    Failed,
    /// Page left before a terminal phase; no restart.
    Left,
    /// Factory reset via the secondary button; restart requested.
    /// `erased` is false when the store could not be wiped.
    FactoryReset { erased: bool },
}

pub type PhaseObserver = Box<dyn FnMut(&WizardState) + Send>;

/// Erase calibration and restart. The restart is requested even when the
/// erase fails; the error is returned after.
pub fn factory_reset(store: &CalibrationStore, lifecycle: &dyn Lifecycle) -> Result<()> {
    warn!("factory reset requested");
    let res = store.erase_all();
    if let Err(e) = &res {
        error!(error = %e, "factory reset erase failed");
    }
    lifecycle.restart();
    res
}

/// Abort any calibration run, then erase and restart. The sensor lease is
/// held across the erase: a run that already passed its last abort check
/// finishes its write first, and no new run can start until the erase has
/// committed.
pub(crate) fn stop_and_reset(
    link: &CalibrationLink,
    session: &SensorSession,
    store: &CalibrationStore,
    lifecycle: &dyn Lifecycle,
) -> Result<()> {
    link.abort();
    let _sensor = session.lease();
    debug!("calibration worker idle; erasing");
    factory_reset(store, lifecycle)
}

pub struct WizardRunner {
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) pages: Pages,
    pub(crate) gui: Gui,
    pub(crate) link: CalibrationLink,
    pub(crate) session: SensorSession,
    pub(crate) store: CalibrationStore,
    pub(crate) lifecycle: Arc<dyn Lifecycle + Send + Sync>,
    pub(crate) taps: TapReceiver,
    pub(crate) reset_taps: Option<TapReceiver>,
    pub(crate) cfg: WizardCfg,
    pub(crate) observer: Option<PhaseObserver>,
}

impl WizardRunner {
    /// Called with the new state after every transition.
    pub fn on_phase(mut self, f: impl FnMut(&WizardState) + Send + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    fn show(&mut self, state: &WizardState) {
        let record = if state.phase == Phase::Done {
            self.store.load()
        } else {
            Default::default()
        };
        self.gui.draw(&wizard_screen(state, &record));
        if let Some(obs) = self.observer.as_mut() {
            obs(state);
        }
    }

    fn apply(&self, step: Step) {
        match step.effect {
            Some(Effect::StartAlgorithm(mode)) => {
                self.link.request(mode);
            }
            Some(Effect::AbortAlgorithm) => self.link.abort(),
            None => {}
        }
    }

    /// Drive the wizard until the page is left or a terminal phase is
    /// reached. Terminal phases dwell, then restart exactly once.
    pub fn run(mut self) -> WizardExit {
        let mut wizard = Wizard::new(self.cfg.near_countdown, self.cfg.far_countdown);
        let mut interval = Interval::new(self.cfg.tick, self.clock.now());
        info!("calibration wizard started");
        self.show(&wizard.state());

        while self.pages.is(Page::Calibration) && !wizard.phase().is_terminal() {
            if self.reset_taps.as_ref().is_some_and(TapReceiver::take) {
                let erased =
                    stop_and_reset(&self.link, &self.session, &self.store, self.lifecycle.as_ref())
                        .is_ok();
                return WizardExit::FactoryReset { erased };
            }

            let before = wizard.phase();
            let mut changed = false;

            if wizard.phase().is_countdown() && interval.due(self.clock.now()) {
                let step = wizard.tick();
                self.apply(step);
                changed |= step.changed;
            }
            if wizard.phase().run_mode().is_some() {
                let step = wizard.observe(&self.link.status());
                self.apply(step);
                changed |= step.changed;
            }
            if self.taps.take() {
                info!(phase = ?wizard.phase(), "tap");
                let step = wizard.tap();
                self.apply(step);
                changed |= step.changed;
            }

            if wizard.phase() != before && wizard.phase().is_countdown() {
                interval.reset(self.clock.now());
            }
            if changed {
                self.show(&wizard.state());
            }
            self.clock.sleep(self.cfg.poll);
        }

        info!(phase = ?wizard.phase(), "calibration wizard loop ended");
        if self.pages.is(Page::Calibration) {
            self.clock.sleep(self.cfg.dwell);
        }
        match wizard.phase() {
            Phase::Done | Phase::Failed => {
                if self.cfg.startup_screen_before_restart {
                    self.gui.draw(&startup_screen());
                }
                info!("restarting device");
                self.lifecycle.restart();
                if wizard.phase() == Phase::Done {
                    WizardExit::Completed
                } else {
                    WizardExit::Failed
                }
            }
            _ => WizardExit::Left,
        }
    }
}
