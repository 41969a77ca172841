//! Payload layouts for the I2C and GPIO operations.
//!
//! # I2C request (op 0)
//!
//! ```text
//! byte 0   [read:1][address:7]
//! write:   byte 1.. bytes to write
//! read:    byte 1  [unused:3][read_length:5]
//!          byte 2.. register-select bytes written before the read
//! ```
//!
//! # I2C response
//!
//! ```text
//! byte 0   address | 0x80 for reads
//! byte 1   status: 0x40 on failure, low 5 bits = read length for reads
//! byte 2.. echoed written bytes, then read bytes (reads only)
//! ```
//!
//! # GPIO (op 1)
//!
//! ```text
//! byte 0   [request:1][unused:2][group:5]
//! byte 1   inverted pin state (responses and notifications only)
//! ```

use heapless::Vec;

use crate::frame::{FrameError, PayloadBuf};

/// Read flag in I2C byte 0, request flag in GPIO byte 0.
pub const DIRECTION_FLAG: u8 = 0x80;

/// Error bit in the I2C status byte and GPIO byte 0.
pub const STATUS_ERROR: u8 = 0x40;

const ADDRESS_MASK: u8 = 0x7F;
const LENGTH_MASK: u8 = 0x1F;

/// Bytes preceding the echoed data in an I2C response.
pub const I2C_RESPONSE_HEADER: usize = 2;

/// A parsed I2C request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cRequest<'a> {
    /// Write `data` to the device.
    Write {
        /// 7-bit device address
        address: u8,
        /// Bytes to write
        data: &'a [u8],
    },
    /// Write `select` (possibly empty), then read `read_len` bytes.
    Read {
        /// 7-bit device address
        address: u8,
        /// Number of bytes to read (0-31)
        read_len: u8,
        /// Register-select bytes written first
        select: &'a [u8],
    },
}

impl<'a> I2cRequest<'a> {
    /// Parse an I2C request payload.
    ///
    /// An empty payload, or a read without its length byte, is
    /// [`FrameError::Truncated`].
    pub fn parse(payload: &'a [u8]) -> Result<Self, FrameError> {
        let (&first, rest) = payload.split_first().ok_or(FrameError::Truncated)?;
        let address = first & ADDRESS_MASK;

        if first & DIRECTION_FLAG == 0 {
            return Ok(Self::Write {
                address,
                data: rest,
            });
        }

        let (&len_byte, select) = rest.split_first().ok_or(FrameError::Truncated)?;
        Ok(Self::Read {
            address,
            read_len: len_byte & LENGTH_MASK,
            select,
        })
    }

    /// 7-bit device address.
    #[must_use]
    pub fn address(&self) -> u8 {
        match *self {
            Self::Write { address, .. } | Self::Read { address, .. } => address,
        }
    }

    /// True for read requests.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Size of the response payload this request produces.
    #[must_use]
    pub fn response_len(&self) -> usize {
        match *self {
            Self::Write { data, .. } => I2C_RESPONSE_HEADER + data.len(),
            Self::Read {
                read_len, select, ..
            } => I2C_RESPONSE_HEADER + select.len() + usize::from(read_len),
        }
    }
}

/// An I2C response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cResponse<'a> {
    /// Result of a write request.
    Write {
        /// 7-bit device address
        address: u8,
        /// Whether the device failed to acknowledge
        failed: bool,
        /// Bytes that were written, echoed back
        written: &'a [u8],
    },
    /// Result of a read request.
    Read {
        /// 7-bit device address
        address: u8,
        /// Whether either phase failed
        failed: bool,
        /// Register-select bytes, echoed back
        written: &'a [u8],
        /// Bytes read (zero-filled on failure)
        data: &'a [u8],
    },
    /// Request refused before touching the bus; carries no data.
    Rejected {
        /// 7-bit device address
        address: u8,
        /// Whether the request was a read
        read: bool,
        /// Requested read length (reads only)
        read_len: u8,
    },
}

impl I2cResponse<'_> {
    /// Encode the response payload.
    pub fn encode(&self) -> Result<PayloadBuf, FrameError> {
        let mut out = Vec::new();
        match *self {
            Self::Write {
                address,
                failed,
                written,
            } => {
                push(&mut out, address & ADDRESS_MASK)?;
                push(&mut out, status(0, failed))?;
                extend(&mut out, written)?;
            }
            Self::Read {
                address,
                failed,
                written,
                data,
            } => {
                push(&mut out, (address & ADDRESS_MASK) | DIRECTION_FLAG)?;
                push(&mut out, status(data.len() as u8, failed))?;
                extend(&mut out, written)?;
                extend(&mut out, data)?;
            }
            Self::Rejected {
                address,
                read,
                read_len,
            } => {
                let flag = if read { DIRECTION_FLAG } else { 0 };
                push(&mut out, (address & ADDRESS_MASK) | flag)?;
                push(&mut out, status(read_len, true))?;
            }
        }
        Ok(out)
    }
}

fn status(len: u8, failed: bool) -> u8 {
    let err = if failed { STATUS_ERROR } else { 0 };
    (len & LENGTH_MASK) | err
}

fn push(out: &mut PayloadBuf, byte: u8) -> Result<(), FrameError> {
    out.push(byte).map_err(|_| FrameError::PayloadTooLarge)
}

fn extend(out: &mut PayloadBuf, bytes: &[u8]) -> Result<(), FrameError> {
    out.extend_from_slice(bytes)
        .map_err(|_| FrameError::PayloadTooLarge)
}

/// A parsed GPIO request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioRequest {
    /// Raw byte 0, echoed in error replies.
    pub raw: u8,
    /// Request bit.
    pub is_request: bool,
    /// Pin-group selector.
    pub group: u8,
}

impl GpioRequest {
    /// Parse a GPIO request payload. Only byte 0 is inspected.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let &raw = payload.first().ok_or(FrameError::Truncated)?;
        Ok(Self {
            raw,
            is_request: raw & DIRECTION_FLAG != 0,
            group: raw & LENGTH_MASK,
        })
    }

    /// Error reply: byte 0 with the error bit set and no pin data.
    #[must_use]
    pub fn error_reply(&self) -> [u8; 1] {
        [self.raw | STATUS_ERROR]
    }
}

/// Pin state report carried by GPIO responses and change notifications.
///
/// The pin byte is the inverted state restricted to the group's mask, in
/// responses as well as notifications. Pins outside the group read 0, not 1,
/// so a fully released 4-pin group reports `0x00` rather than `0xF0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioReport {
    /// Pin-group selector.
    pub group: u8,
    /// Masked pin state as sampled (active-low inputs read 0 when asserted).
    pub state: u8,
    /// Pins belonging to the group.
    pub mask: u8,
}

impl GpioReport {
    /// Payload answering a peer request (request bit set).
    #[must_use]
    pub fn response(&self) -> [u8; 2] {
        [DIRECTION_FLAG | (self.group & LENGTH_MASK), self.inverted()]
    }

    /// Payload of an unsolicited change notification.
    #[must_use]
    pub fn notification(&self) -> [u8; 2] {
        [self.group & LENGTH_MASK, self.inverted()]
    }

    fn inverted(&self) -> u8 {
        !self.state & self.mask
    }
}
