use thiserror::Error;

/// Driver-level failures. `Code` carries a raw driver status for anything
/// without a dedicated variant.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("ranging timeout")]
    Timeout,
    #[error("data-ready timeout after {0} polls")]
    DataReadyTimeout(u32),
    #[error("control interface error: {0}")]
    ControlInterface(String),
    #[error("operation not supported by device")]
    NotSupported,
    #[error("driver error code {0}")]
    Code(i8),
    #[error("store format: {0}")]
    Format(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    /// Numeric driver code, using the conventional negative status values.
    pub fn code(&self) -> i8 {
        match self {
            HwError::Timeout | HwError::DataReadyTimeout(_) => -7,
            HwError::ControlInterface(_) => -20,
            HwError::NotSupported => -8,
            HwError::Code(c) => *c,
            HwError::Format(_) | HwError::Io(_) => -99,
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
