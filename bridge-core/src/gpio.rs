//! GPIO input sampling and change detection.

use crate::config::PinGroup;

/// A parallel input port.
pub trait PinBank {
    /// Read the raw port register.
    fn read_port(&mut self) -> u8;
}

/// Samples a [`PinBank`] and reports changes on the watched pin group.
pub struct GpioSampler<P> {
    bank: P,
    watched: Option<PinGroup>,
    last: u8,
}

impl<P: PinBank> GpioSampler<P> {
    /// Create a sampler. The snapshot starts at zero, so a group with any
    /// pin high reports a change on the first poll.
    pub fn new(bank: P, watched: Option<PinGroup>) -> Self {
        Self {
            bank,
            watched,
            last: 0,
        }
    }

    /// Current state of `group`, masked.
    pub fn read_group(&mut self, group: PinGroup) -> u8 {
        self.bank.read_port() & group.mask
    }

    /// Group whose changes are reported by [`poll`](Self::poll).
    pub fn watched(&self) -> Option<PinGroup> {
        self.watched
    }

    /// Last state reported by [`poll`](Self::poll).
    pub fn snapshot(&self) -> u8 {
        self.last
    }

    /// Sample the watched group.
    ///
    /// Returns the new masked state if it differs from the snapshot, and
    /// stores it as the new snapshot.
    pub fn poll(&mut self) -> Option<u8> {
        let group = self.watched?;
        let state = self.read_group(group);
        if state == self.last {
            return None;
        }
        self.last = state;
        Some(state)
    }

    /// Pin bank.
    pub fn bank_mut(&mut self) -> &mut P {
        &mut self.bank
    }
}
