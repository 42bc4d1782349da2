use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxiError {
    #[error("driver error: {0}")]
    Driver(String),
    #[error("driver init failed: {0}")]
    DriverInit(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    /// Soft failure: the search found nothing usable or was aborted.
    #[error("calibration failed, try again")]
    CalibrationWarning,
    #[error("unexpected algorithm result: {0}")]
    UnexpectedResult(String),
    #[error("store error: {0}")]
    Store(String),
    /// The config file could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor")]
    MissingSensor,
    #[error("missing store")]
    MissingStore,
    #[error("missing display")]
    MissingDisplay,
    #[error("missing lifecycle")]
    MissingLifecycle,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
