//! Simulated bus target and helpers for host tests.

extern crate std;

use core::cell::RefCell;
use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::bus::{BusEvent, BusRegisters, BusShared, Direction};

/// A register operation seen by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Start(u8, Direction),
    WaitStartSent,
    Stop,
    Write(u8),
    Read(u8),
}

struct State {
    address: u8,
    rx: Vec<u8>,
    rx_pos: usize,
    nack_after: Option<usize>,
    nack_reads: bool,
    stalled: bool,
    written: usize,
    stopped: bool,
    ops: Vec<Op>,
    events: VecDeque<BusEvent>,
}

/// One device on a simulated bus.
///
/// Register operations are logged and the hardware events they would cause
/// are queued for [`run`] to deliver, the way an interrupt would.
#[derive(Clone)]
pub struct SimTarget {
    state: Rc<RefCell<State>>,
}

impl SimTarget {
    /// A target acknowledging `address`.
    pub fn new(address: u8) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                address,
                rx: Vec::new(),
                rx_pos: 0,
                nack_after: None,
                nack_reads: false,
                stalled: false,
                written: 0,
                stopped: false,
                ops: Vec::new(),
                events: VecDeque::new(),
            })),
        }
    }

    /// Bytes returned by each read, restarting at every START.
    pub fn with_rx(self, bytes: &[u8]) -> Self {
        self.state.borrow_mut().rx = bytes.to_vec();
        self
    }

    /// NACK the data byte at `index` of every write.
    pub fn nack_after(self, index: usize) -> Self {
        self.state.borrow_mut().nack_after = Some(index);
        self
    }

    /// NACK the address of every read while still accepting writes.
    pub fn nack_reads(self) -> Self {
        self.state.borrow_mut().nack_reads = true;
        self
    }

    /// Never raise an event, as if the bus were held low.
    pub fn stalled(self) -> Self {
        self.state.borrow_mut().stalled = true;
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    fn next_event(&self) -> Option<BusEvent> {
        self.state.borrow_mut().events.pop_front()
    }
}

impl State {
    fn raise(&mut self, event: BusEvent) {
        if !self.stalled {
            self.events.push_back(event);
        }
    }
}

impl BusRegisters for SimTarget {
    fn start(&mut self, address: u8, direction: Direction) {
        let mut s = self.state.borrow_mut();
        s.ops.push(Op::Start(address, direction));
        s.rx_pos = 0;
        s.written = 0;
        s.stopped = false;

        if address != s.address || (direction == Direction::Read && s.nack_reads) {
            s.raise(BusEvent::Nack);
            return;
        }
        match direction {
            Direction::Write => s.raise(BusEvent::TxEmpty),
            Direction::Read => s.raise(BusEvent::RxFull),
        }
    }

    fn wait_start_sent(&mut self) {
        self.state.borrow_mut().ops.push(Op::WaitStartSent);
    }

    fn stop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.ops.push(Op::Stop);
        s.stopped = true;
    }

    fn write_data(&mut self, byte: u8) {
        let mut s = self.state.borrow_mut();
        s.ops.push(Op::Write(byte));
        let index = s.written;
        s.written += 1;
        if s.nack_after == Some(index) {
            s.raise(BusEvent::Nack);
        } else {
            s.raise(BusEvent::TxEmpty);
        }
    }

    fn read_data(&mut self) -> u8 {
        let mut s = self.state.borrow_mut();
        let byte = s.rx.get(s.rx_pos).copied().unwrap_or(0xFF);
        s.rx_pos += 1;
        s.ops.push(Op::Read(byte));
        // The byte after a STOP request is the last one clocked in
        if !s.stopped {
            s.raise(BusEvent::RxFull);
        }
        byte
    }
}

/// Delay that never elapses.
pub struct NeverDelay;

impl DelayNs for NeverDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        core::future::pending::<()>().await
    }
}

/// Delay that elapses immediately.
pub struct InstantDelay;

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

fn noop_waker() -> Waker {
    fn noop_raw_waker() -> RawWaker {
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            noop_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    // SAFETY: the vtable functions do nothing
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Drive `fut` to completion, delivering the target's queued events to
/// `shared` whenever it is pending.
pub fn run<M: RawMutex, F: Future>(
    shared: &BusShared<M, SimTarget>,
    target: &SimTarget,
    fut: F,
) -> F::Output {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut fut = pin!(fut);

    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        match target.next_event() {
            Some(event) => shared.on_event(event),
            None => panic!("future pending with no bus events queued"),
        }
    }
}
