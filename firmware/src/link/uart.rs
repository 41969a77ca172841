//! Frame transport over the radio module's UART.

use bridge_core::{ChannelId, Transport, TransportError};
use bridge_proto::{FrameAssembler, FrameBuf};
use embassy_rp::uart::{Async, Error as UartError, UartRx, UartTx};

/// Convert UART errors to [`TransportError`].
///
/// This is a helper function instead of a `From` impl to avoid orphan rule issues
/// (both `UartError` and `TransportError` are defined in external crates).
#[inline]
fn uart_error_to_transport_error(e: UartError) -> TransportError {
    match e {
        UartError::Overrun => TransportError::Overflow,
        _ => TransportError::Io,
    }
}

/// Receive half: cuts the serial byte stream into frames.
pub struct UartLinkRx<'d> {
    rx: UartRx<'d, Async>,
    assembler: FrameAssembler,
}

impl<'d> UartLinkRx<'d> {
    /// Create a receiver from the given UART receiver.
    #[must_use]
    pub fn new(rx: UartRx<'d, Async>) -> Self {
        Self {
            rx,
            assembler: FrameAssembler::new(),
        }
    }

    /// Read bytes until a whole frame has arrived.
    ///
    /// A UART error drops the partial frame so the next header byte starts
    /// a fresh one.
    pub async fn receive_frame(&mut self) -> Result<FrameBuf, TransportError> {
        let mut byte = [0u8; 1];

        loop {
            if let Err(e) = self.rx.read(&mut byte).await {
                self.assembler.reset();
                return Err(uart_error_to_transport_error(e));
            }

            if let Some(frame) = self.assembler.push(byte[0]) {
                return Ok(frame);
            }
        }
    }
}

/// Send half: writes each frame whole.
pub struct UartLinkTx<'d> {
    tx: UartTx<'d, Async>,
}

impl<'d> UartLinkTx<'d> {
    /// Create a transmitter from the given UART transmitter.
    #[must_use]
    pub fn new(tx: UartTx<'d, Async>) -> Self {
        Self { tx }
    }
}

impl Transport for UartLinkTx<'_> {
    // The module has one channel, so the id is not put on the wire
    async fn send(&mut self, _channel: ChannelId, frame: &[u8]) -> Result<(), TransportError> {
        self.tx
            .write(frame)
            .await
            .map_err(uart_error_to_transport_error)
    }
}
