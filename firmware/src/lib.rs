//! Radio-to-I2C bridge firmware for RP2040.
//!
//! A remote peer connected through a serial radio module issues I2C
//! register reads and writes on the local bus and is notified when any of
//! four input pins changes.
//!
//! # Hardware Configuration
//!
//! | Function   | GPIO  | Description |
//! |------------|-------|-------------|
//! | I2C0 SDA   | 4     | Bus data |
//! | I2C0 SCL   | 5     | Bus clock |
//! | UART1 TX   | 8     | To radio module RX |
//! | UART1 RX   | 9     | From radio module TX |
//! | Link state | 10    | High while a peer is connected |
//! | Inputs     | 12-15 | Active-low pin group 2 |
//! | LED        | 25    | Heartbeat |
//!
//! # Architecture
//!
//! Tasks:
//!
//! - **Link state task**: turns edges on the module's status pin into open/close events
//! - **Link RX task**: assembles frames from the UART byte stream
//! - **Bridge task**: runs [`ProtocolDispatcher`], the only code that touches the bus,
//!   the input pins or the UART transmitter
//! - **Heartbeat task**: blinks the LED
//!
//! The first two feed one [`Channel`](embassy_sync::channel::Channel) of
//! [`LinkEvent`]s, so frames and link changes reach the dispatcher in the
//! order they happened. Bus events arrive through the I2C0 interrupt and
//! [`i2c_bus::BUS`].
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)
//! - **`fast-i2c`**: Run the bus in fast mode (400 kHz)

#![no_std]

pub use bridge_core::{
    BridgeConfig, BusConfig, BusEngine, ChannelId, LinkEvent, ProtocolDispatcher, ProtocolError,
};

pub mod i2c_bus;
pub mod link;
pub mod pins;

use core::future::Future;

use bridge_core::Cadence;
use embassy_rp::gpio::Input;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Ticker};

pub use i2c_bus::{InterruptHandler as I2cInterruptHandler, Rp2040Bus, BUS};
pub use link::{LinkMonitor, UartLinkRx, UartLinkTx, RADIO_CHANNEL};
pub use pins::PortPins;

/// Bus engine running on I2C0.
pub type Engine = BusEngine<'static, CriticalSectionRawMutex, Rp2040Bus, Delay>;

/// The dispatcher as wired on this board.
pub type Bridge = ProtocolDispatcher<Engine, PortPins<Input<'static>>, UartLinkTx<'static>>;

/// Bus speed selected by features.
pub const BUS_CONFIG: BusConfig = if cfg!(feature = "fast-i2c") {
    BusConfig::FAST
} else {
    BusConfig::STANDARD
};

/// GPIO poll cadence.
pub struct PollTicker(Ticker);

impl PollTicker {
    /// Tick every `config.poll_interval_ms`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self(Ticker::every(embassy_time::Duration::from_millis(u64::from(
            config.poll_interval_ms,
        ))))
    }
}

impl Cadence for PollTicker {
    fn tick(&mut self) -> impl Future<Output = ()> {
        self.0.next()
    }
}
