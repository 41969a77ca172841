//! Wire format for the radio-to-I2C bridge.
//!
//! This crate provides everything needed to speak the bridge protocol:
//!
//! - **Framing**: the 3-byte header codec
//!   - [`Frame`] - A decoded frame
//!   - [`encode()`] / [`decode()`] - Header packing and unpacking
//!   - [`FrameAssembler`] - Cuts frames out of a serial byte stream
//!
//! - **Payloads**: typed views of the operation payloads
//!   - [`I2cRequest`] / [`I2cResponse`] - Register read/write
//!   - [`GpioRequest`] / [`GpioReport`] - Pin-group query and notification
//!
//! # Frame Format
//!
//! ```text
//! ┌──────────────────────┬─────┬──────┬──────────────┐
//! │ [op:3][total_len:5]  │ SEQ │ CORR │ PAYLOAD      │
//! │ 1B                   │ 1B  │ 1B   │ 0–28B        │
//! └──────────────────────┴─────┴──────┴──────────────┘
//! ```
//!
//! `SEQ` runs modulo 255 per sender. `CORR` echoes the peer's `SEQ` in a
//! response, or is [`UNSOLICITED`] (0xFF) for notifications.
//!
//! # Example
//!
//! ```
//! use bridge_proto::{decode, encode_to_vec, I2cRequest, OpType, UNSOLICITED};
//!
//! let bytes = encode_to_vec(OpType::I2c, 0, UNSOLICITED, &[0x48, 0x01, 0x60]).unwrap();
//! assert_eq!(bytes[0], 0x06);
//!
//! let frame = decode(&bytes).unwrap();
//! let request = I2cRequest::parse(&frame.payload).unwrap();
//! assert_eq!(request.address(), 0x48);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod assembler;
pub mod frame;
pub mod payload;

pub use assembler::FrameAssembler;
pub use frame::{
    declared_length, decode, encode, encode_to_vec, Frame, FrameBuf, FrameError, OpType,
    PayloadBuf, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, UNSOLICITED,
};
pub use payload::{
    GpioReport, GpioRequest, I2cRequest, I2cResponse, DIRECTION_FLAG, I2C_RESPONSE_HEADER,
    STATUS_ERROR,
};
