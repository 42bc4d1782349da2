//! Test and helper doubles for proxi_core.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use proxi_traits::{
    BoxError, Clock, DisplaySurface, DriverMode, InitParams, KvStore, Lifecycle, Measurement,
    RangingSensor, Screen,
};

/// Keeps every rendered frame. Clones share the frame list.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<Screen>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Screen> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Screen> {
        self.frames.lock().ok().and_then(|f| f.last().cloned())
    }
}

impl DisplaySurface for RecordingDisplay {
    fn render(&mut self, screen: &Screen) -> Result<(), BoxError> {
        self.frames
            .lock()
            .map_err(|_| "frame list poisoned")?
            .push(screen.clone());
        Ok(())
    }
}

/// Counts restart requests and remembers when they happened.
#[derive(Clone)]
pub struct RestartRecorder {
    count: Arc<AtomicUsize>,
    at: Arc<Mutex<Vec<Instant>>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl RestartRecorder {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            at: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn times(&self) -> Vec<Instant> {
        self.at.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Lifecycle for RestartRecorder {
    fn restart(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut v) = self.at.lock() {
            v.push(self.clock.now());
        }
    }
}

/// Key/value store whose every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

impl KvStore for FailingStore {
    fn get_u32(&self, _ns: &str, _key: &str) -> Result<Option<u32>, BoxError> {
        Err("nvs read failed".into())
    }
    fn set_u32(&mut self, _ns: &str, _key: &str, _v: u32) -> Result<(), BoxError> {
        Err("nvs write failed".into())
    }
    fn commit(&mut self) -> Result<(), BoxError> {
        Err("nvs commit failed".into())
    }
    fn erase_all(&mut self) -> Result<(), BoxError> {
        Err("nvs erase failed".into())
    }
}

type ReadFn = dyn FnMut(&InitParams, u32) -> Result<Measurement, BoxError> + Send;

/// Sensor answering from a closure of (active params, read index).
pub struct ScriptedSensor {
    active: Option<InitParams>,
    reads: u32,
    read: Box<ReadFn>,
    /// Every successful init, in order.
    pub inits: Arc<Mutex<Vec<InitParams>>>,
    pub fail_init: bool,
}

impl ScriptedSensor {
    pub fn new(
        read: impl FnMut(&InitParams, u32) -> Result<Measurement, BoxError> + Send + 'static,
    ) -> Self {
        Self {
            active: None,
            reads: 0,
            read: Box::new(read),
            inits: Arc::new(Mutex::new(Vec::new())),
            fail_init: false,
        }
    }

    /// Range is a function of the applied compensation only.
    pub fn by_compensation(f: impl Fn(u32) -> u16 + Send + 'static) -> Self {
        Self::new(move |p, _| {
            Ok(Measurement {
                range_mm: f(p.compensation),
                signal_rate: 20 << 16,
                ambient_rate: 1 << 16,
                status: 0,
            })
        })
    }
}

impl RangingSensor for ScriptedSensor {
    fn init(&mut self, params: &InitParams) -> Result<(), BoxError> {
        if self.fail_init {
            return Err("init failed: control interface".into());
        }
        if let Ok(mut v) = self.inits.lock() {
            v.push(*params);
        }
        self.active = Some(*params);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), BoxError> {
        self.active = None;
        Ok(())
    }

    fn get_measurement(&mut self) -> Result<Measurement, BoxError> {
        let params = self.active.ok_or("sensor not ranging")?;
        let idx = self.reads;
        self.reads += 1;
        (self.read)(&params, idx)
    }
}

/// Convenience: the mode of each recorded init.
pub fn init_modes(inits: &Mutex<Vec<InitParams>>) -> Vec<DriverMode> {
    inits
        .lock()
        .map(|v| v.iter().map(|p| p.mode).collect())
        .unwrap_or_default()
}
