//! Compile-time bridge configuration.

/// One GPIO pin group the peer may query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinGroup {
    /// Selector carried in the low 5 bits of GPIO byte 0.
    pub id: u8,
    /// Bits of the input port that belong to this group.
    pub mask: u8,
}

impl PinGroup {
    /// Create a pin group.
    #[must_use]
    pub const fn new(id: u8, mask: u8) -> Self {
        Self { id, mask }
    }
}

/// The four active-low inputs exposed as group 2.
pub const DEFAULT_GROUPS: &[PinGroup] = &[PinGroup::new(2, 0x0F)];

/// Bridge configuration.
///
/// The first entry of `groups` is the group the sampler watches for
/// unsolicited change notifications.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Pin groups answered by GPIO requests.
    pub groups: &'static [PinGroup],
    /// Bus watchdog: abort a transaction after this long.
    pub bus_timeout_us: u32,
    /// GPIO poll cadence.
    pub poll_interval_ms: u32,
}

impl BridgeConfig {
    /// Default configuration.
    pub const DEFAULT: Self = Self {
        groups: DEFAULT_GROUPS,
        bus_timeout_us: 25_000,
        poll_interval_ms: 10,
    };

    /// Look up a pin group by selector.
    #[must_use]
    pub fn group(&self, id: u8) -> Option<PinGroup> {
        self.groups.iter().copied().find(|g| g.id == id)
    }

    /// Group sampled for change notifications.
    #[must_use]
    pub fn watched_group(&self) -> Option<PinGroup> {
        self.groups.first().copied()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Bus peripheral configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl BusConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };
}
