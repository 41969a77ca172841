//! Platform-agnostic engine and routing for the radio-to-I2C bridge.
//!
//! This crate holds everything between the radio link and the hardware
//! registers, with no chip-specific code, so it runs both on the target
//! and on the host under test.
//!
//! - [`bus`]: interrupt-driven I2C master ([`BusShared`], [`BusEngine`])
//! - [`gpio`]: pin sampling and change detection ([`GpioSampler`])
//! - [`link`]: transport traits and connection state ([`Transport`], [`LinkSource`])
//! - [`dispatcher`]: frame routing and replies ([`ProtocolDispatcher`])
//! - [`config`]: compile-time settings ([`BridgeConfig`])
//!
//! # Wiring
//!
//! The bus peripheral's interrupt handler owns nothing but a reference to a
//! static [`BusShared`]; it calls [`BusShared::on_event`] for every status
//! bit it sees. The application task builds a [`BusEngine`] over the same
//! static and hands it to the dispatcher together with a [`PinBank`] and a
//! [`Transport`], then calls [`ProtocolDispatcher::run`].
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and log output

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod macros;

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod gpio;
pub mod link;

#[cfg(test)]
mod sim;

pub use bus::{
    BusEngine, BusError, BusEvent, BusMachine, BusRegisters, BusShared, Direction, I2cMaster, Phase,
    ReadBuf, MAX_TRANSFER,
};
pub use config::{BridgeConfig, BusConfig, PinGroup, DEFAULT_GROUPS};
pub use dispatcher::{ProtocolDispatcher, ProtocolError};
pub use gpio::{GpioSampler, PinBank};
pub use link::{Cadence, ChannelId, LinkEvent, LinkSource, LinkState, Transport, TransportError};
