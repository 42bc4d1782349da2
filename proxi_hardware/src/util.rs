use std::time::Duration;

use proxi_traits::Clock;

use crate::error::{HwError, Result};

/// Poll `is_ready` until it reports true, sleeping `poll_interval` between
/// attempts, for at most `max_polls` attempts. Errors from the probe end the
/// wait immediately.
pub fn wait_until_ready(
    mut is_ready: impl FnMut() -> Result<bool>,
    max_polls: u32,
    poll_interval: Duration,
    clock: &dyn Clock,
) -> Result<()> {
    for _ in 0..max_polls {
        if is_ready()? {
            return Ok(());
        }
        clock.sleep(poll_interval);
    }
    Err(HwError::DataReadyTimeout(max_polls))
}
