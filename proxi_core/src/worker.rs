//! Background calibration worker.
//!
//! Owns a thread that waits for run requests, leases the sensor for the
//! whole run and publishes the outcome to the shared result cell.
//!
//! Each `CalibrationWorker` spawns exactly one thread, which is shut down
//! and joined when the worker is dropped.
use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::calibration::Calibrator;
use crate::link::{AlgorithmResult, CalibrationLink};
use crate::session::SensorSession;

/// How often an idle worker re-checks its shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(50);

pub struct CalibrationWorker {
    link: CalibrationLink,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl CalibrationWorker {
    pub fn spawn(session: SensorSession, calibrator: Calibrator) -> Self {
        let (tx, rx) = xch::bounded(1);
        let result = Arc::new(Mutex::new(AlgorithmResult::Idle));
        let abort = calibrator.abort_flag();
        let link = CalibrationLink::new(tx, Arc::clone(&result), abort);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::Builder::new()
            .name("proxi-calibration".to_string())
            .spawn(move || {
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("calibration worker received shutdown signal");
                        break;
                    }
                    let req = match rx.recv_timeout(IDLE_POLL) {
                        Ok(req) => req,
                        Err(xch::RecvTimeoutError::Timeout) => continue,
                        Err(xch::RecvTimeoutError::Disconnected) => {
                            tracing::debug!("calibration link dropped, exiting worker");
                            break;
                        }
                    };
                    let outcome = {
                        let mut sensor = session.lease();
                        calibrator.run(req.mode, &mut **sensor)
                    };
                    tracing::info!(?outcome, "calibration run finished");
                    *result.lock().unwrap_or_else(|p| p.into_inner()) = outcome;
                }
                tracing::trace!("calibration worker exiting cleanly");
            });

        let join_handle = match join_handle {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn calibration worker");
                None
            }
        };

        Self {
            link,
            shutdown,
            join_handle,
        }
    }

    /// A handle for requesting runs and polling their outcome.
    pub fn link(&self) -> CalibrationLink {
        self.link.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CalibrationWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // A run in progress notices the abort at its next read.
        self.link.abort();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("calibration worker joined"),
                Err(e) => tracing::warn!(?e, "calibration worker panicked during shutdown"),
            }
        }
    }
}
