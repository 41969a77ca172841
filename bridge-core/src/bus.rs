//! Interrupt-driven I2C master engine.
//!
//! The engine is split in two halves sharing one [`BusShared`]:
//!
//! - the interrupt handler translates peripheral status into [`BusEvent`]s
//!   and calls [`BusShared::on_event`], which advances the [`BusMachine`]
//!   and signals completion;
//! - [`BusEngine`] runs in task context, arms a transaction, then waits for
//!   the completion signal or the watchdog, whichever comes first.
//!
//! ```text
//! Idle -> Addressing -> Transferring -> Completing -> Idle
//!            |               |              |
//!            +---- NACK -----+--------------+--> STOP, Idle, NoAck
//! ```

use core::cell::RefCell;
use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

/// Largest single transfer the engine buffers.
pub const MAX_TRANSFER: usize = 32;

/// Bytes returned by a read.
pub type ReadBuf = Vec<u8, MAX_TRANSFER>;

/// Errors reported by the bus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Target did not acknowledge the address or a data byte.
    NoAck,
    /// Transaction did not complete before the watchdog expired.
    Timeout,
    /// A transaction is already in flight.
    Busy,
    /// Transfer longer than [`MAX_TRANSFER`].
    TooLong,
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoAck => write!(f, "no acknowledge"),
            Self::Timeout => write!(f, "bus timeout"),
            Self::Busy => write!(f, "bus busy"),
            Self::TooLong => write!(f, "transfer too long"),
        }
    }
}

/// Transfer direction, sent as the R/W bit after the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master transmits.
    Write,
    /// Master receives.
    Read,
}

/// Peripheral status delivered by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    /// Transmit register can take the next byte, or the final byte has
    /// gone out after STOP was requested.
    TxEmpty,
    /// A received byte is waiting in the data register.
    RxFull,
    /// Address or data byte was not acknowledged.
    Nack,
}

/// Transaction phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No transaction outstanding.
    Idle,
    /// START and address sent, waiting for the first event.
    Addressing,
    /// Data bytes moving.
    Transferring,
    /// STOP requested; waiting for the last byte to go out or come in.
    Completing,
}

/// Register-level operations a bus peripheral must provide.
///
/// Every call happens with the [`BusShared`] lock held, from either the
/// interrupt handler or the task arming a transaction.
pub trait BusRegisters {
    /// Generate START followed by the address and R/W bit.
    fn start(&mut self, address: u8, direction: Direction);

    /// Spin until the START condition is on the wire.
    ///
    /// Only used by single-byte reads, which must request STOP before the
    /// byte arrives. Bounded by a few bus clocks.
    fn wait_start_sent(&mut self);

    /// Generate STOP after the byte currently being transferred, or the
    /// one written next.
    fn stop(&mut self);

    /// Load the next byte to transmit.
    fn write_data(&mut self, byte: u8);

    /// Take the received byte.
    fn read_data(&mut self) -> u8;

    /// Flush operations buffered by the preceding calls.
    ///
    /// Called once after every group of operations. Peripherals that need
    /// to know about STOP before pushing the final byte defer their writes
    /// until here.
    fn commit(&mut self) {}
}

/// The transaction state machine driven by [`BusEvent`]s.
pub struct BusMachine<R> {
    regs: R,
    phase: Phase,
    direction: Direction,
    buffer: ReadBuf,
    len: usize,
    index: usize,
}

impl<R: BusRegisters> BusMachine<R> {
    /// Create an idle machine over `regs`.
    pub const fn new(regs: R) -> Self {
        Self {
            regs,
            phase: Phase::Idle,
            direction: Direction::Write,
            buffer: Vec::new(),
            len: 0,
            index: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True when no transaction is outstanding.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Register backend.
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Mutable register backend.
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Arm a write of `data` to `address`.
    ///
    /// An empty write succeeds without touching the bus; the machine stays
    /// idle and no completion follows.
    pub fn begin_write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        if !self.is_idle() {
            return Err(BusError::Busy);
        }
        if data.is_empty() {
            return Ok(());
        }
        self.buffer = Vec::from_slice(data).map_err(|_| BusError::TooLong)?;
        self.len = data.len();
        self.index = 0;
        self.direction = Direction::Write;
        self.phase = Phase::Addressing;

        self.regs.start(address, Direction::Write);
        self.regs.commit();
        Ok(())
    }

    /// Arm a read of `len` bytes from `address`.
    ///
    /// Like [`begin_write`](Self::begin_write), `len == 0` is a no-op.
    pub fn begin_read(&mut self, address: u8, len: usize) -> Result<(), BusError> {
        if !self.is_idle() {
            return Err(BusError::Busy);
        }
        if len > MAX_TRANSFER {
            return Err(BusError::TooLong);
        }
        if len == 0 {
            self.buffer.clear();
            return Ok(());
        }
        self.buffer.clear();
        self.len = len;
        self.index = 0;
        self.direction = Direction::Read;
        self.phase = Phase::Addressing;

        self.regs.start(address, Direction::Read);
        if len == 1 {
            // STOP must be latched before the only byte is clocked in
            self.regs.wait_start_sent();
            self.regs.stop();
            self.phase = Phase::Completing;
        }
        self.regs.commit();
        Ok(())
    }

    /// Advance on a hardware event.
    ///
    /// Returns the transaction outcome once it has finished. Events arriving
    /// while idle are ignored.
    pub fn on_event(&mut self, event: BusEvent) -> Option<Result<(), BusError>> {
        if self.is_idle() {
            return None;
        }

        let outcome = match (event, self.direction) {
            (BusEvent::Nack, _) => {
                self.regs.stop();
                self.phase = Phase::Idle;
                Some(Err(BusError::NoAck))
            }
            (BusEvent::TxEmpty, Direction::Write) => self.on_tx_empty(),
            (BusEvent::RxFull, Direction::Read) => self.on_rx_full(),
            _ => None,
        };
        self.regs.commit();
        outcome
    }

    fn on_tx_empty(&mut self) -> Option<Result<(), BusError>> {
        if self.phase == Phase::Completing {
            self.phase = Phase::Idle;
            return Some(Ok(()));
        }

        let Some(&byte) = self.buffer.get(self.index) else {
            // Buffer exhausted: release the bus
            self.regs.stop();
            self.phase = Phase::Idle;
            return Some(Ok(()));
        };
        self.regs.write_data(byte);
        self.index += 1;
        if self.index >= self.len {
            self.regs.stop();
            self.phase = Phase::Completing;
        } else {
            self.phase = Phase::Transferring;
        }
        None
    }

    fn on_rx_full(&mut self) -> Option<Result<(), BusError>> {
        let byte = self.regs.read_data();
        // len <= MAX_TRANSFER was checked when arming
        let _ = self.buffer.push(byte);
        self.index += 1;

        match self.len - self.index {
            0 => {
                self.phase = Phase::Idle;
                Some(Ok(()))
            }
            1 => {
                self.regs.stop();
                self.phase = Phase::Completing;
                None
            }
            _ => {
                self.phase = Phase::Transferring;
                None
            }
        }
    }

    /// Abandon the outstanding transaction, issuing STOP.
    ///
    /// Returns false if the machine was already idle.
    pub fn abort(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        self.regs.stop();
        self.regs.commit();
        self.phase = Phase::Idle;
        true
    }

    /// Take the bytes collected by the last read.
    pub fn take_buffer(&mut self) -> ReadBuf {
        core::mem::take(&mut self.buffer)
    }
}

/// State shared between the interrupt handler and [`BusEngine`].
pub struct BusShared<M: RawMutex, R> {
    machine: Mutex<M, RefCell<BusMachine<R>>>,
    done: Signal<M, Result<(), BusError>>,
}

impl<M: RawMutex, R: BusRegisters> BusShared<M, R> {
    /// Create shared state over `regs`.
    pub const fn new(regs: R) -> Self {
        Self {
            machine: Mutex::new(RefCell::new(BusMachine::new(regs))),
            done: Signal::new(),
        }
    }

    /// Run `f` with exclusive access to the state machine.
    pub fn with<T>(&self, f: impl FnOnce(&mut BusMachine<R>) -> T) -> T {
        self.machine.lock(|machine| f(&mut machine.borrow_mut()))
    }

    /// Feed a hardware event. Call from the interrupt handler.
    pub fn on_event(&self, event: BusEvent) {
        if let Some(result) = self.with(|machine| machine.on_event(event)) {
            self.done.signal(result);
        }
    }
}

/// Async I2C master operations used by the dispatcher.
pub trait I2cMaster {
    /// Write `data` to the device at `address`.
    fn write(&mut self, address: u8, data: &[u8]) -> impl Future<Output = Result<(), BusError>>;

    /// Read `len` bytes from the device at `address`.
    fn read(&mut self, address: u8, len: u8) -> impl Future<Output = Result<ReadBuf, BusError>>;
}

/// Task-side half of the bus engine.
pub struct BusEngine<'a, M: RawMutex, R, D> {
    shared: &'a BusShared<M, R>,
    delay: D,
    timeout_us: u32,
}

impl<'a, M: RawMutex, R: BusRegisters, D: DelayNs> BusEngine<'a, M, R, D> {
    /// Create an engine driving `shared`, aborting transactions that take
    /// longer than `timeout_us`.
    pub fn new(shared: &'a BusShared<M, R>, delay: D, timeout_us: u32) -> Self {
        Self {
            shared,
            delay,
            timeout_us,
        }
    }

    async fn transact(
        &mut self,
        arm: impl FnOnce(&mut BusMachine<R>) -> Result<(), BusError>,
    ) -> Result<(), BusError> {
        self.shared.done.reset();
        self.shared.with(arm)?;

        match select(self.shared.done.wait(), self.delay.delay_us(self.timeout_us)).await {
            Either::First(result) => result,
            Either::Second(()) => {
                if self.shared.with(BusMachine::abort) {
                    warn!("bus watchdog expired, transaction aborted");
                    Err(BusError::Timeout)
                } else {
                    // Finished between the watchdog firing and taking the lock
                    self.shared.done.try_take().unwrap_or(Err(BusError::Timeout))
                }
            }
        }
    }
}

impl<M: RawMutex, R: BusRegisters, D: DelayNs> I2cMaster for BusEngine<'_, M, R, D> {
    async fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }
        trace!("i2c write {=u8:x} len {}", address, data.len());
        self.transact(|machine| machine.begin_write(address, data))
            .await
    }

    async fn read(&mut self, address: u8, len: u8) -> Result<ReadBuf, BusError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        trace!("i2c read {=u8:x} len {}", address, len);
        self.transact(|machine| machine.begin_read(address, usize::from(len)))
            .await?;
        Ok(self.shared.with(BusMachine::take_buffer))
    }
}
