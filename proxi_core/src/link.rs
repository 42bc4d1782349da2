//! Request/response plumbing between the wizard and the calibration worker.
//!
//! One coalescing start slot (bounded(1) channel), one result cell and one
//! cooperative abort flag. Nothing else crosses the thread boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel as xch;
use tracing::{debug, warn};

/// Which search a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Crosstalk search with the user at the near target.
    NearField,
    /// Sensitivity search with the user out of range.
    FarField,
}

/// Start request. Abort is not part of the request: it goes through the
/// link's shared flag so it can reach a run that already dequeued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmRunRequest {
    pub mode: RunMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Search finished without a usable value, or was aborted.
    Warning,
    /// The driver failed hard.
    Driver(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AlgorithmResult {
    #[default]
    Idle,
    Running(RunMode),
    Succeeded(RunMode),
    Failed(RunMode, FailureKind),
}

impl AlgorithmResult {
    pub fn is_running(&self) -> bool {
        matches!(self, AlgorithmResult::Running(_))
    }
}

/// Handle held by the requesting side. Clones share the same worker.
#[derive(Debug, Clone)]
pub struct CalibrationLink {
    tx: xch::Sender<AlgorithmRunRequest>,
    result: Arc<Mutex<AlgorithmResult>>,
    abort: Arc<AtomicBool>,
}

impl CalibrationLink {
    pub(crate) fn new(
        tx: xch::Sender<AlgorithmRunRequest>,
        result: Arc<Mutex<AlgorithmResult>>,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self { tx, result, abort }
    }

    /// Ask the worker to run `mode`. Clears any stale abort and marks the
    /// result as running before the worker picks the request up, so a poll
    /// right after this call never sees the previous outcome. A request
    /// arriving while one is still queued is coalesced; returns false then.
    pub fn request(&self, mode: RunMode) -> bool {
        self.abort.store(false, Ordering::Release);
        *self.result.lock().unwrap_or_else(|p| p.into_inner()) = AlgorithmResult::Running(mode);
        match self.tx.try_send(AlgorithmRunRequest { mode }) {
            Ok(()) => true,
            Err(xch::TrySendError::Full(_)) => {
                debug!(?mode, "run request coalesced");
                false
            }
            Err(xch::TrySendError::Disconnected(_)) => {
                warn!(?mode, "calibration worker gone");
                *self.result.lock().unwrap_or_else(|p| p.into_inner()) = AlgorithmResult::Failed(
                    mode,
                    FailureKind::Driver("calibration worker not running".to_string()),
                );
                false
            }
        }
    }

    /// Ask a running search to stop at the next read.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn status(&self) -> AlgorithmResult {
        self.result.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
