//! I2C0 backend for the bus engine.
//!
//! The RP2040 I2C block is a DesignWare controller: it has no separate
//! START/STOP strobes. START and the address go out with the first command
//! pushed into `IC_DATA_CMD`, and STOP is a flag on the last command. Data
//! bytes are therefore held back until [`BusRegisters::commit`], when it is
//! known whether STOP belongs to them.
//!
//! Events are mapped as follows:
//!
//! | Status bit  | Event                                   |
//! |-------------|-----------------------------------------|
//! | `TX_ABRT`   | [`BusEvent::Nack`]                      |
//! | `STOP_DET`  | [`BusEvent::TxEmpty`] (write finished)  |
//! | `RX_FULL`   | [`BusEvent::RxFull`]                    |
//! | `TX_EMPTY`  | [`BusEvent::TxEmpty`]                   |
//!
//! # Pins
//!
//! - GPIO 4: SDA
//! - GPIO 5: SCL

use bridge_core::{BusConfig, BusEvent, BusRegisters, BusShared, Direction};
use embassy_rp::i2c::{Blocking, Config as I2cConfig, I2c, SclPin, SdaPin};
use embassy_rp::interrupt::typelevel::{Binding, Handler, Interrupt, I2C0_IRQ};
use embassy_rp::pac;
use embassy_rp::peripherals::I2C0;
use embassy_rp::Peri;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Bus engine state shared with the I2C0 interrupt.
pub static BUS: BusShared<CriticalSectionRawMutex, Rp2040Bus> = BusShared::new(Rp2040Bus::new());

/// Register backend for I2C0.
pub struct Rp2040Bus {
    direction: Direction,
    /// Data byte waiting for commit.
    held: Option<u8>,
    stop_requested: bool,
    /// A command carrying STOP has been queued, or the controller stopped
    /// on its own after an abort.
    stop_issued: bool,
    /// A read command is queued and its byte has not been taken yet.
    read_outstanding: bool,
}

impl Rp2040Bus {
    /// Create the backend. Nothing touches the hardware until [`init`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            direction: Direction::Write,
            held: None,
            stop_requested: false,
            stop_issued: false,
            read_outstanding: false,
        }
    }

    #[inline]
    fn regs() -> pac::i2c::I2c {
        pac::I2C0
    }

    fn mask_all() {
        Self::regs().ic_intr_mask().write(|w| {
            w.set_m_tx_empty(false);
            w.set_m_rx_full(false);
            w.set_m_tx_abrt(false);
            w.set_m_stop_det(false);
        });
    }

    fn push_command(&mut self, read: bool, byte: u8) {
        let stop = self.stop_requested;
        Self::regs().ic_data_cmd().write(|w| {
            w.set_cmd(read);
            w.set_stop(stop);
            w.set_dat(byte);
        });

        if stop {
            self.stop_issued = true;
            if self.direction == Direction::Write {
                // Completion is reported on STOP_DET from here on
                Self::regs().ic_intr_mask().modify(|w| {
                    w.set_m_tx_empty(false);
                    w.set_m_stop_det(true);
                });
            }
        }
    }

    /// Translate the highest-priority pending status bit into an event.
    ///
    /// Called from the interrupt handler. Clears the status it reports.
    pub fn take_event(&mut self) -> Option<BusEvent> {
        let regs = Self::regs();
        let stat = regs.ic_intr_stat().read();

        if stat.r_tx_abrt() {
            defmt::trace!("i2c abort source {=u32:x}", regs.ic_tx_abrt_source().read().0);
            regs.ic_clr_intr().read();
            Self::mask_all();
            // The controller flushes its FIFO and releases the bus itself
            self.stop_issued = true;
            self.held = None;
            return Some(BusEvent::Nack);
        }
        if stat.r_stop_det() {
            regs.ic_clr_stop_det().read();
            Self::mask_all();
            return Some(BusEvent::TxEmpty);
        }
        if stat.r_rx_full() {
            return Some(BusEvent::RxFull);
        }
        if stat.r_tx_empty() {
            return Some(BusEvent::TxEmpty);
        }
        None
    }
}

impl Default for Rp2040Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusRegisters for Rp2040Bus {
    fn start(&mut self, address: u8, direction: Direction) {
        let regs = Self::regs();

        // Target address can only change while the controller is disabled
        regs.ic_enable().write(|w| w.set_enable(false));
        regs.ic_tar().write(|w| w.set_ic_tar(u16::from(address)));
        regs.ic_enable().write(|w| w.set_enable(true));
        regs.ic_clr_intr().read();

        self.direction = direction;
        self.held = None;
        self.stop_requested = false;
        self.stop_issued = false;
        self.read_outstanding = false;

        regs.ic_intr_mask().write(|w| {
            w.set_m_tx_abrt(true);
            match direction {
                Direction::Write => w.set_m_tx_empty(true),
                Direction::Read => w.set_m_rx_full(true),
            }
        });
    }

    fn wait_start_sent(&mut self) {
        // START goes out with the first queued command, which carries STOP
        // already, so there is nothing to wait for
    }

    fn stop(&mut self) {
        self.stop_requested = true;
    }

    fn write_data(&mut self, byte: u8) {
        self.held = Some(byte);
    }

    fn read_data(&mut self) -> u8 {
        self.read_outstanding = false;
        let byte = Self::regs().ic_data_cmd().read().dat();
        if self.stop_issued {
            Self::mask_all();
        }
        byte
    }

    fn commit(&mut self) {
        if self.stop_issued {
            return;
        }

        match self.direction {
            Direction::Write => {
                if let Some(byte) = self.held.take() {
                    self.push_command(false, byte);
                    return;
                }
            }
            Direction::Read => {
                if !self.read_outstanding {
                    self.read_outstanding = true;
                    self.push_command(true, 0);
                    return;
                }
            }
        }

        if self.stop_requested {
            // Nothing left to attach STOP to: abandon the transfer
            Self::regs().ic_enable().modify(|w| w.set_abort(true));
            Self::mask_all();
            self.stop_issued = true;
        }
    }
}

/// I2C0 interrupt handler feeding [`BUS`].
pub struct InterruptHandler;

impl Handler<I2C0_IRQ> for InterruptHandler {
    unsafe fn on_interrupt() {
        if let Some(event) = BUS.with(|machine| machine.regs_mut().take_event()) {
            BUS.on_event(event);
        }
    }
}

/// Configure I2C0 as a bus master and enable its interrupt.
///
/// Pin muxing, clock dividers and controller mode come from the HAL's
/// blocking driver; afterwards the engine drives the registers directly.
pub fn init(
    peri: Peri<'static, I2C0>,
    scl: Peri<'static, impl SclPin<I2C0>>,
    sda: Peri<'static, impl SdaPin<I2C0>>,
    _irq: impl Binding<I2C0_IRQ, InterruptHandler>,
    bus_config: BusConfig,
) -> I2c<'static, I2C0, Blocking> {
    let mut config = I2cConfig::default();
    config.frequency = bus_config.frequency;
    let i2c = I2c::new_blocking(peri, scl, sda, config);

    let regs = Rp2040Bus::regs();
    regs.ic_tx_tl().write(|w| w.set_tx_tl(0));
    regs.ic_rx_tl().write(|w| w.set_rx_tl(0));
    Rp2040Bus::mask_all();

    I2C0_IRQ::unpend();
    // SAFETY: the handler only touches BUS, which is ready before any
    // transaction can enable an interrupt source
    unsafe { I2C0_IRQ::enable() };

    i2c
}
