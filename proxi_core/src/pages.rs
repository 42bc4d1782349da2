//! Which page currently owns the screen.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Page {
    PresenceTest = 0,
    Calibration = 1,
    /// Any page outside the proximity subsystem.
    Other = 2,
}

impl Page {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Page::PresenceTest,
            1 => Page::Calibration,
            _ => Page::Other,
        }
    }
}

/// Shared page index. Polling loops exit once their page is no longer
/// current.
#[derive(Debug, Clone)]
pub struct Pages(Arc<AtomicU8>);

impl Pages {
    pub fn new(initial: Page) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn current(&self) -> Page {
        Page::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is(&self, page: Page) -> bool {
        self.current() == page
    }

    pub fn navigate(&self, page: Page) {
        tracing::debug!(?page, "navigate");
        self.0.store(page as u8, Ordering::Release);
    }
}
