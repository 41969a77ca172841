//! Frame reassembly for byte-stream transports.
//!
//! Datagram transports hand over whole frames. Serial radio modules deliver a
//! plain byte stream instead, so frames are cut out of it using the total
//! length carried in each header byte.

use crate::frame::{declared_length, FrameBuf, HEADER_SIZE};

/// Collects stream bytes into whole frames.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    buffer: FrameBuf,
    expected: usize,
}

impl FrameAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: FrameBuf::new(),
            expected: 0,
        }
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
    }

    /// True while a frame is partially received.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Feed one byte.
    ///
    /// Returns the complete frame once its last byte arrives. Header bytes
    /// declaring fewer than [`HEADER_SIZE`] bytes cannot start a frame and
    /// are discarded.
    pub fn push(&mut self, byte: u8) -> Option<FrameBuf> {
        if self.buffer.is_empty() {
            let total = declared_length(byte);
            if total < HEADER_SIZE {
                return None;
            }
            self.expected = total;
        }

        // Capacity equals the largest declarable length, so this cannot fail
        let _ = self.buffer.push(byte);

        if self.buffer.len() == self.expected {
            let frame = core::mem::take(&mut self.buffer);
            self.expected = 0;
            return Some(frame);
        }
        None
    }
}
