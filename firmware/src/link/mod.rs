//! Radio module attached over UART.
//!
//! The module bridges one wireless channel to a serial port and raises a
//! "connected" output while a peer is attached. Frames cross the serial
//! port back to back, delimited only by their header length.
//!
//! # Pins
//!
//! Uses UART1:
//! - GPIO 8: TX (to module RX)
//! - GPIO 9: RX (from module TX)
//! - GPIO 10: link state (high while connected)

pub mod state;
pub mod uart;

pub use state::LinkMonitor;
pub use uart::{UartLinkRx, UartLinkTx};

use bridge_core::ChannelId;

/// The module carries a single channel.
pub const RADIO_CHANNEL: ChannelId = ChannelId(1);
