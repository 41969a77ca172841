//! Frame encoding and decoding.
//!
//! Frame format:
//! - HEADER (1 byte): `[op_type:3][total_length:5]`
//! - SEQ (1 byte): sender's running sequence number
//! - CORR (1 byte): sequence number being answered, or [`UNSOLICITED`]
//! - PAYLOAD (0-28 bytes)
//!
//! The 5-bit length field counts the whole frame including the three header
//! bytes, so a frame never exceeds 31 bytes. There is no checksum; the
//! transport is expected to deliver whole, ordered frames.

use heapless::Vec;

/// Number of header bytes preceding the payload.
pub const HEADER_SIZE: usize = 3;

/// Largest frame the 5-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = 0x1F;

/// Maximum payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Correlation byte carried by frames that answer nothing.
pub const UNSOLICITED: u8 = 0xFF;

const LENGTH_MASK: u8 = 0x1F;
const OP_SHIFT: u32 = 5;

/// Fixed-capacity buffer holding one encoded frame.
pub type FrameBuf = Vec<u8, MAX_FRAME_SIZE>;

/// Fixed-capacity buffer holding one frame payload.
pub type PayloadBuf = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Errors that can occur during frame decoding or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer bytes than the header or the declared length requires
    Truncated,
    /// Payload does not fit the 5-bit length field
    PayloadTooLarge,
    /// Output buffer too small for encoding
    BufferTooSmall,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

/// Operation carried by a frame (top three header bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpType {
    /// I2C register read/write.
    I2c,
    /// GPIO pin-group query or change notification.
    Gpio,
    /// Values 2-7, not handled by this protocol revision.
    Reserved(u8),
}

impl OpType {
    /// Decode the 3-bit operation field. Bits above the field are ignored.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::I2c,
            1 => Self::Gpio,
            other => Self::Reserved(other),
        }
    }

    /// The 3-bit value written to the header.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::I2c => 0,
            Self::Gpio => 1,
            Self::Reserved(bits) => bits & 0x07,
        }
    }
}

/// A decoded or constructed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Operation type
    pub op: OpType,
    /// Sender-assigned sequence number
    pub seq: u8,
    /// Correlation byte
    pub corr: u8,
    /// Payload data
    pub payload: PayloadBuf,
}

impl Frame {
    /// Create a new frame, rejecting payloads over [`MAX_PAYLOAD_SIZE`].
    pub fn new(op: OpType, seq: u8, corr: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let payload = Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self {
            op,
            seq,
            corr,
            payload,
        })
    }

    /// Payload length, excluding the header.
    #[inline]
    #[must_use]
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// True when the frame is not a response to a peer request.
    #[inline]
    #[must_use]
    pub fn is_unsolicited(&self) -> bool {
        self.corr == UNSOLICITED
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        encode(self.op, self.seq, self.corr, &self.payload, buffer)
    }

    /// Encode this frame into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<FrameBuf, FrameError> {
        encode_to_vec(self.op, self.seq, self.corr, &self.payload)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Frame {{ op: {}, seq: {}, corr: {}, payload: {=[u8]:x} }}",
            self.op,
            self.seq,
            self.corr,
            self.payload.as_slice()
        );
    }
}

/// Write `[(op << 5) | (len + 3), seq, corr, payload...]` into `buffer`.
///
/// Returns the number of bytes written.
pub fn encode(
    op: OpType,
    seq: u8,
    corr: u8,
    payload: &[u8],
    buffer: &mut [u8],
) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let frame_len = HEADER_SIZE + payload.len();
    if buffer.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    buffer[0] = (op.bits() << OP_SHIFT) | frame_len as u8;
    buffer[1] = seq;
    buffer[2] = corr;
    buffer[HEADER_SIZE..frame_len].copy_from_slice(payload);

    Ok(frame_len)
}

/// Encode a frame into a heapless Vec sized for the largest frame.
pub fn encode_to_vec(
    op: OpType,
    seq: u8,
    corr: u8,
    payload: &[u8],
) -> Result<FrameBuf, FrameError> {
    let mut buffer = [0u8; MAX_FRAME_SIZE];
    let len = encode(op, seq, corr, payload, &mut buffer)?;
    Vec::from_slice(&buffer[..len]).map_err(|_| FrameError::BufferTooSmall)
}

/// Total frame length declared by a header byte.
#[inline]
#[must_use]
pub const fn declared_length(header: u8) -> usize {
    (header & LENGTH_MASK) as usize
}

/// Decode one frame from the start of `bytes`.
///
/// Bytes past the declared frame length are ignored.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::Truncated);
    }

    let total = declared_length(bytes[0]);
    if total < HEADER_SIZE || total > bytes.len() {
        return Err(FrameError::Truncated);
    }

    Frame::new(
        OpType::from_bits(bytes[0] >> OP_SHIFT),
        bytes[1],
        bytes[2],
        &bytes[HEADER_SIZE..total],
    )
}
