//! Transport link traits and connection state.

use core::future::Future;

use bridge_proto::FrameBuf;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;

/// Handle of an open radio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(pub u16);

/// Whether a peer is connected, and on which channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// No peer; outbound frames are dropped.
    #[default]
    Disconnected,
    /// Peer connected on the given channel.
    Connected(ChannelId),
}

impl LinkState {
    /// True when a peer is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Channel of the connected peer.
    pub fn channel(&self) -> Option<ChannelId> {
        match *self {
            Self::Connected(id) => Some(id),
            Self::Disconnected => None,
        }
    }
}

/// Error type for transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No peer connected.
    NotConnected,
    /// Underlying I/O error.
    Io,
    /// Outbound buffer full.
    Overflow,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Io => write!(f, "transport I/O error"),
            Self::Overflow => write!(f, "transport overflow"),
        }
    }
}

/// Outbound half of the radio link.
pub trait Transport {
    /// Send one encoded frame on `channel`.
    ///
    /// The frame must go out whole; implementations may wait for buffer
    /// space but must not interleave it with another frame.
    fn send(
        &mut self,
        channel: ChannelId,
        frame: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>>;
}

/// Something the link layer reports to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A peer connected.
    Opened(ChannelId),
    /// The peer went away.
    Closed,
    /// A whole frame arrived.
    Data(ChannelId, FrameBuf),
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkEvent {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Opened(id) => defmt::write!(f, "Opened({})", id),
            Self::Closed => defmt::write!(f, "Closed"),
            Self::Data(id, frame) => defmt::write!(f, "Data({}, {=[u8]:x})", id, frame.as_slice()),
        }
    }
}

/// Inbound half of the radio link.
pub trait LinkSource {
    /// Wait for the next link event.
    fn receive(&mut self) -> impl Future<Output = LinkEvent>;
}

impl<M: RawMutex, const N: usize> LinkSource for Receiver<'_, M, LinkEvent, N> {
    fn receive(&mut self) -> impl Future<Output = LinkEvent> {
        Receiver::receive(self)
    }
}

/// Fixed-rate tick driving GPIO polling.
pub trait Cadence {
    /// Wait for the next tick.
    fn tick(&mut self) -> impl Future<Output = ()>;
}
