//! Button handling: long-press gating and tap delivery.

use crossbeam_channel as xch;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    /// Repeated while held; carries the time held so far.
    LongPressRepeat { held: Duration },
    PressLost,
    Released,
}

/// Turns a stream of button events into at most one tap per press, once the
/// press has been held for `threshold`.
#[derive(Debug, Clone)]
pub struct ButtonGate {
    threshold: Duration,
    sent: bool,
}

impl ButtonGate {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            sent: false,
        }
    }

    /// Returns true when this event produces a tap.
    pub fn on_event(&mut self, ev: ButtonEvent) -> bool {
        match ev {
            ButtonEvent::LongPressRepeat { held } if held >= self.threshold && !self.sent => {
                self.sent = true;
                true
            }
            ButtonEvent::Released => {
                self.sent = false;
                false
            }
            _ => false,
        }
    }
}

/// Create a coalescing tap notification: any number of taps sent before the
/// receiver looks collapse into one.
pub fn tap_channel() -> (TapSender, TapReceiver) {
    let (tx, rx) = xch::bounded(1);
    (TapSender(tx), TapReceiver(rx))
}

#[derive(Debug, Clone)]
pub struct TapSender(xch::Sender<()>);

impl TapSender {
    pub fn notify(&self) {
        // Full means a tap is already pending.
        let _ = self.0.try_send(());
    }
}

#[derive(Debug, Clone)]
pub struct TapReceiver(xch::Receiver<()>);

impl TapReceiver {
    /// Consume a pending tap without blocking.
    pub fn take(&self) -> bool {
        self.0.try_recv().is_ok()
    }
}

/// A gated button wired to a tap channel.
#[derive(Debug, Clone)]
pub struct Button {
    gate: ButtonGate,
    taps: TapSender,
}

impl Button {
    pub fn new(threshold: Duration, taps: TapSender) -> Self {
        Self {
            gate: ButtonGate::new(threshold),
            taps,
        }
    }

    pub fn on_event(&mut self, ev: ButtonEvent) {
        if self.gate.on_event(ev) {
            tracing::debug!("tap");
            self.taps.notify();
        }
    }

    /// Full long press followed by release.
    pub fn press(&mut self) {
        let held = self.gate.threshold;
        self.on_event(ButtonEvent::Pressed);
        self.on_event(ButtonEvent::LongPressRepeat { held });
        self.on_event(ButtonEvent::Released);
    }
}
