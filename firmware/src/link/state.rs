//! Link state from the radio module's status pin.

use bridge_core::LinkEvent;
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;

use super::RADIO_CHANNEL;

/// Watches the module's connection output.
pub struct LinkMonitor<P> {
    pin: P,
    connected: bool,
}

impl<P: InputPin + Wait> LinkMonitor<P> {
    /// Create a monitor. The link is considered down until the pin reads
    /// high.
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            connected: false,
        }
    }

    /// Wait for the link to open or close.
    ///
    /// Glitches that return to the previous level before being sampled are
    /// not reported.
    pub async fn next(&mut self) -> LinkEvent {
        loop {
            // A pin read error is treated as a dropped link
            let level = self.pin.is_high().unwrap_or(false);
            if level != self.connected {
                self.connected = level;
                return if level {
                    LinkEvent::Opened(RADIO_CHANNEL)
                } else {
                    LinkEvent::Closed
                };
            }
            let _ = self.pin.wait_for_any_edge().await;
        }
    }
}
