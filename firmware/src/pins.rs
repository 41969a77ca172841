//! Input pin group sampled by the bridge.
//!
//! # Pins
//!
//! GPIO 12-15 form port bits 0-3. They are active-low inputs with pull-ups,
//! so an idle pin reads 1.

use bridge_core::PinBank;
use embedded_hal::digital::InputPin;

/// Number of pins in the port.
pub const PORT_WIDTH: usize = 4;

/// Parallel input port assembled from individual pins, bit `n` being
/// `pins[n]`.
pub struct PortPins<P> {
    pins: [P; PORT_WIDTH],
}

impl<P: InputPin> PortPins<P> {
    /// Create a port from pins ordered by bit position.
    pub fn new(pins: [P; PORT_WIDTH]) -> Self {
        Self { pins }
    }
}

impl<P: InputPin> PinBank for PortPins<P> {
    fn read_port(&mut self) -> u8 {
        self.pins
            .iter_mut()
            .enumerate()
            .fold(0, |port, (bit, pin)| {
                // Unreadable pins read as idle
                if pin.is_high().unwrap_or(true) {
                    port | (1 << bit)
                } else {
                    port
                }
            })
    }
}
