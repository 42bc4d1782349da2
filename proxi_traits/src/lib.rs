pub mod clock;

pub use clock::{Clock, MonotonicClock, SimClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One ranging sample. Signal and ambient rates are 16.16 fixed-point MCps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Measurement {
    pub range_mm: u16,
    pub signal_rate: u32,
    pub ambient_rate: u32,
    /// Driver range status; anything but 0 marks the sample invalid.
    pub status: u8,
}

/// Which driver profile to bring the sensor up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    /// Normal continuous ranging, long timing budget.
    Ranging,
    /// Short timing budget used while sweeping crosstalk candidates.
    Calibration,
}

/// Fixed driver tuning handed through to the sensor untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorProfile {
    pub ranging_budget_us: u32,
    pub calibration_budget_us: u32,
    pub signal_rate_limit_mcps: f32,
    pub sigma_limit_mm: f32,
    pub pre_range_vcsel_period: u8,
    pub final_range_vcsel_period: u8,
    pub offset_um: i32,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            ranging_budget_us: 200_000,
            calibration_budget_us: 33_000,
            signal_rate_limit_mcps: 0.1,
            sigma_limit_mm: 60.0,
            pre_range_vcsel_period: 18,
            final_range_vcsel_period: 14,
            offset_um: 10_800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitParams {
    /// Crosstalk compensation rate; 0 disables compensation.
    pub compensation: u32,
    pub mode: DriverMode,
    pub profile: SensorProfile,
}

/// Time-of-flight ranging device. `init` leaves the sensor in continuous
/// ranging; `deinit` stops it and waits for the stop to complete.
pub trait RangingSensor {
    fn init(&mut self, params: &InitParams) -> Result<(), BoxError>;
    fn deinit(&mut self) -> Result<(), BoxError>;
    /// Block (bounded) until the next sample is ready and return it.
    fn get_measurement(&mut self) -> Result<Measurement, BoxError>;
}

impl<T: RangingSensor + ?Sized> RangingSensor for Box<T> {
    fn init(&mut self, params: &InitParams) -> Result<(), BoxError> {
        (**self).init(params)
    }
    fn deinit(&mut self) -> Result<(), BoxError> {
        (**self).deinit()
    }
    fn get_measurement(&mut self) -> Result<Measurement, BoxError> {
        (**self).get_measurement()
    }
}

/// Namespaced non-volatile key/value storage holding u32 entries.
pub trait KvStore {
    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, BoxError>;
    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> Result<(), BoxError>;
    /// Make previous writes durable.
    fn commit(&mut self) -> Result<(), BoxError>;
    /// Erase every namespace. Durable when it returns Ok.
    fn erase_all(&mut self) -> Result<(), BoxError>;
}

/// Content for one page redraw. The surface owns layout and fonts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    pub title: String,
    pub body: String,
    /// Label of the primary button, if the page shows one.
    pub button: Option<String>,
}

pub trait DisplaySurface {
    fn render(&mut self, screen: &Screen) -> Result<(), BoxError>;
}

/// Device lifecycle hooks.
pub trait Lifecycle {
    /// Request an unconditional device restart.
    fn restart(&self);
}
