//! Maps `Box<dyn Error>` from trait boundaries to typed `ProxiError`.
//!
//! With the `hardware-errors` feature, `proxi_hardware::HwError` is
//! downcast for a precise mapping; anything else goes through a string
//! heuristic.

use crate::error::ProxiError;

pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ProxiError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<proxi_hardware::HwError>() {
            return match hw {
                proxi_hardware::HwError::Timeout | proxi_hardware::HwError::DataReadyTimeout(_) => {
                    ProxiError::Timeout
                }
                other => ProxiError::Driver(format!("{other} (code {})", other.code())),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ProxiError::Timeout
    } else {
        ProxiError::Driver(s)
    }
}

/// Same mapping for an init failure, which is always hard.
pub fn map_init_error(e: &(dyn std::error::Error + 'static)) -> ProxiError {
    match map_hw_error(e) {
        ProxiError::Driver(msg) => ProxiError::DriverInit(msg),
        ProxiError::Timeout => ProxiError::DriverInit("timeout".to_string()),
        other => other,
    }
}
