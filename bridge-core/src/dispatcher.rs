//! Routes inbound frames to the bus and GPIO handlers and sends replies.

use bridge_proto::{
    decode, encode, Frame, FrameError, GpioReport, GpioRequest, I2cRequest, I2cResponse, OpType,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, UNSOLICITED,
};
use embassy_futures::select::{select, Either};

use crate::bus::{BusError, I2cMaster, ReadBuf};
use crate::config::BridgeConfig;
use crate::gpio::{GpioSampler, PinBank};
use crate::link::{Cadence, ChannelId, LinkEvent, LinkSource, LinkState, Transport, TransportError};

/// Error type for frame handling.
///
/// Frame and op errors mean the frame was dropped without a reply.
/// `UnsupportedGroup` and `ResponseOverflow` mean an error reply was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Reserved operation type.
    UnknownOpType,
    /// GPIO request for a pin group not in the configuration.
    UnsupportedGroup,
    /// Reply would not fit in one frame.
    ResponseOverflow,
    /// Malformed frame or payload.
    Frame(FrameError),
    /// Reply could not be sent.
    Transport(TransportError),
}

impl From<FrameError> for ProtocolError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownOpType => write!(f, "unknown operation type"),
            Self::UnsupportedGroup => write!(f, "unsupported pin group"),
            Self::ResponseOverflow => write!(f, "response too large"),
            Self::Frame(e) => write!(f, "frame error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// The protocol endpoint.
///
/// Owns the outbound sequence counter and the link state. Frames are handled
/// one at a time; a reply is encoded and handed to the transport before the
/// next frame or GPIO poll is looked at.
pub struct ProtocolDispatcher<B, P, T> {
    bus: B,
    gpio: GpioSampler<P>,
    transport: T,
    link: LinkState,
    ownseq: u8,
    config: BridgeConfig,
}

impl<B: I2cMaster, P: PinBank, T: Transport> ProtocolDispatcher<B, P, T> {
    /// Create a dispatcher. The link starts disconnected.
    pub fn new(bus: B, bank: P, transport: T, config: BridgeConfig) -> Self {
        Self {
            bus,
            gpio: GpioSampler::new(bank, config.watched_group()),
            transport,
            link: LinkState::Disconnected,
            ownseq: 0,
            config,
        }
    }

    /// Current link state.
    pub fn link(&self) -> LinkState {
        self.link
    }

    /// Sequence number the next outbound frame will carry.
    pub fn ownseq(&self) -> u8 {
        self.ownseq
    }

    /// A peer connected on `channel`.
    pub fn on_link_open(&mut self, channel: ChannelId) {
        info!("link open on channel {}", channel.0);
        self.link = LinkState::Connected(channel);
    }

    /// The peer disconnected.
    pub fn on_link_close(&mut self) {
        info!("link closed");
        self.link = LinkState::Disconnected;
    }

    /// Handle one inbound frame.
    pub async fn on_frame_received(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let frame = decode(bytes).inspect_err(|e| debug!("dropping frame: {}", e))?;
        trace!("rx {}", frame);

        match frame.op {
            OpType::I2c => self.handle_i2c(&frame).await,
            OpType::Gpio => self.handle_gpio(&frame).await,
            OpType::Reserved(_bits) => {
                debug!("dropping frame with op {}", _bits);
                Err(ProtocolError::UnknownOpType)
            }
        }
    }

    async fn handle_i2c(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let request = I2cRequest::parse(&frame.payload)
            .inspect_err(|_| debug!("dropping empty i2c request"))?;

        if request.response_len() > MAX_PAYLOAD_SIZE {
            warn!("i2c reply to {=u8:x} too large", request.address());
            let read_len = match request {
                I2cRequest::Read { read_len, .. } => read_len,
                I2cRequest::Write { .. } => 0,
            };
            let reply = I2cResponse::Rejected {
                address: request.address(),
                read: request.is_read(),
                read_len,
            }
            .encode()?;
            self.send_frame(OpType::I2c, frame.seq, &reply).await?;
            return Err(ProtocolError::ResponseOverflow);
        }

        let reply = match request {
            I2cRequest::Write { address, data } => {
                let result = self.bus.write(address, data).await;
                log_bus_result(address, result);
                I2cResponse::Write {
                    address,
                    failed: result.is_err(),
                    written: data,
                }
                .encode()?
            }
            I2cRequest::Read {
                address,
                read_len,
                select,
            } => {
                // A failed register select skips the read entirely
                let result = match self.bus.write(address, select).await {
                    Ok(()) => self.bus.read(address, read_len).await,
                    Err(e) => Err(e),
                };
                log_bus_result(address, result.as_ref().map(|_| ()).map_err(|e| *e));

                let failed = result.is_err();
                let data = result.unwrap_or_else(|_| {
                    let mut zeros = ReadBuf::new();
                    let _ = zeros.resize(usize::from(read_len), 0);
                    zeros
                });
                I2cResponse::Read {
                    address,
                    failed,
                    written: select,
                    data: &data,
                }
                .encode()?
            }
        };

        self.send_frame(OpType::I2c, frame.seq, &reply).await
    }

    async fn handle_gpio(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let request = GpioRequest::parse(&frame.payload)?;

        let group = if request.is_request {
            self.config.group(request.group)
        } else {
            None
        };

        let Some(group) = group else {
            warn!("gpio request for unsupported group {}", request.group);
            self.send_frame(OpType::Gpio, frame.seq, &request.error_reply())
                .await?;
            return Err(ProtocolError::UnsupportedGroup);
        };

        let report = GpioReport {
            group: group.id,
            state: self.gpio.read_group(group),
            mask: group.mask,
        };
        self.send_frame(OpType::Gpio, frame.seq, &report.response())
            .await
    }

    /// Send an unsolicited notification carrying `state` of the watched group.
    pub async fn on_gpio_change(&mut self, state: u8) -> Result<(), ProtocolError> {
        let Some(group) = self.gpio.watched() else {
            return Ok(());
        };
        let report = GpioReport {
            group: group.id,
            state,
            mask: group.mask,
        };
        self.send_frame(OpType::Gpio, UNSOLICITED, &report.notification())
            .await
    }

    /// Sample the watched pins and notify the peer of a change.
    ///
    /// The snapshot follows the pins even while disconnected, so nothing is
    /// replayed when a peer connects.
    pub async fn poll_gpio(&mut self) -> Result<(), ProtocolError> {
        match self.gpio.poll() {
            Some(state) if self.link.is_connected() => self.on_gpio_change(state).await,
            _ => Ok(()),
        }
    }

    /// Apply one link event.
    pub async fn handle_event(&mut self, event: LinkEvent) -> Result<(), ProtocolError> {
        match event {
            LinkEvent::Opened(channel) => {
                self.on_link_open(channel);
                Ok(())
            }
            LinkEvent::Closed => {
                self.on_link_close();
                Ok(())
            }
            LinkEvent::Data(_, frame) => self.on_frame_received(&frame).await,
        }
    }

    /// Serve link events and GPIO ticks forever.
    pub async fn run<S: LinkSource, C: Cadence>(&mut self, source: &mut S, cadence: &mut C) -> ! {
        loop {
            let _ = match select(source.receive(), cadence.tick()).await {
                Either::First(event) => self.handle_event(event).await,
                Either::Second(()) => self.poll_gpio().await,
            };
        }
    }

    async fn send_frame(
        &mut self,
        op: OpType,
        corr: u8,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let Some(channel) = self.link.channel() else {
            debug!("link down, reply dropped");
            return Err(TransportError::NotConnected.into());
        };

        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = encode(op, self.ownseq, corr, payload, &mut buffer)?;
        let result = self.transport.send(channel, &buffer[..len]).await;
        self.ownseq = (self.ownseq + 1) % 0xFF;

        result.map_err(|e| {
            warn!("send failed: {}", e);
            e.into()
        })
    }

    /// I2C master.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn log_bus_result(_address: u8, result: Result<(), BusError>) {
    if let Err(_e) = result {
        warn!("i2c {=u8:x} failed: {}", _address, _e);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::bus::{BusEngine, BusShared, Direction};
    use crate::sim::{run, NeverDelay, Op, SimTarget};
    use core::cell::{Cell, RefCell};
    use core::future::Future;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec;

    #[derive(Clone, Default)]
    struct Radio {
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
        fail: Rc<Cell<bool>>,
    }

    impl Radio {
        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.borrow().clone()
        }
    }

    impl Transport for Radio {
        fn send(
            &mut self,
            _channel: ChannelId,
            frame: &[u8],
        ) -> impl Future<Output = Result<(), TransportError>> {
            let result = if self.fail.get() {
                Err(TransportError::Io)
            } else {
                self.sent.borrow_mut().push(frame.to_vec());
                Ok(())
            };
            core::future::ready(result)
        }
    }

    #[derive(Clone, Default)]
    struct Port(Rc<Cell<u8>>);

    impl PinBank for Port {
        fn read_port(&mut self) -> u8 {
            self.0.get()
        }
    }

    type Engine<'a> = BusEngine<'a, NoopRawMutex, SimTarget, NeverDelay>;
    type Dispatcher<'a> = ProtocolDispatcher<Engine<'a>, Port, Radio>;

    fn connected<'a>(
        shared: &'a BusShared<NoopRawMutex, SimTarget>,
        port: &Port,
        radio: &Radio,
    ) -> Dispatcher<'a> {
        let engine = BusEngine::new(shared, NeverDelay, 25_000);
        let mut dispatcher =
            ProtocolDispatcher::new(engine, port.clone(), radio.clone(), BridgeConfig::DEFAULT);
        dispatcher.on_link_open(ChannelId(0x41));
        dispatcher
    }

    #[test]
    fn test_i2c_write_nack_reports_error_and_bus_recovers() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x05, 0x07, 0xFF, 0x00, 0x12]),
        );
        assert_eq!(result, Ok(()));

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x05, 0x08, 0xFF, 0x48, 0x01]),
        );
        assert_eq!(result, Ok(()));

        assert_eq!(
            radio.sent(),
            vec![
                vec![0x06, 0x00, 0x07, 0x00, 0x40, 0x12],
                vec![0x06, 0x01, 0x08, 0x48, 0x00, 0x01],
            ]
        );
    }

    #[test]
    fn test_i2c_read_with_register_select() {
        let target = SimTarget::new(0x48).with_rx(&[0x19, 0x80]);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x06, 0x03, 0xFF, 0xC8, 0x02, 0x00]),
        );
        assert_eq!(result, Ok(()));

        assert_eq!(radio.sent(), vec![vec![0x08, 0x00, 0x03, 0xC8, 0x02, 0x00, 0x19, 0x80]]);
        assert_eq!(
            target.ops(),
            vec![
                Op::Start(0x48, Direction::Write),
                Op::Write(0x00),
                Op::Stop,
                Op::Start(0x48, Direction::Read),
                Op::Read(0x19),
                Op::Stop,
                Op::Read(0x80),
            ]
        );
    }

    #[test]
    fn test_i2c_read_without_select_goes_straight_to_read() {
        let target = SimTarget::new(0x48).with_rx(&[0x7E]);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x05, 0x01, 0xFF, 0xC8, 0x01]),
        );
        assert_eq!(result, Ok(()));

        assert_eq!(radio.sent(), vec![vec![0x06, 0x00, 0x01, 0xC8, 0x01, 0x7E]]);
        assert_eq!(target.ops()[0], Op::Start(0x48, Direction::Read));
    }

    #[test]
    fn test_i2c_failed_select_skips_read() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x06, 0x02, 0xFF, 0xD0, 0x02, 0x00]),
        );
        assert_eq!(result, Ok(()));

        assert_eq!(radio.sent(), vec![vec![0x08, 0x00, 0x02, 0xD0, 0x42, 0x00, 0x00, 0x00]]);
        assert_eq!(target.ops(), vec![Op::Start(0x50, Direction::Write), Op::Stop]);
    }

    #[test]
    fn test_i2c_failed_read_phase_zero_fills_reply() {
        let target = SimTarget::new(0x48).nack_reads();
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x06, 0x03, 0xFF, 0xC8, 0x02, 0x00]),
        );
        assert_eq!(result, Ok(()));

        assert_eq!(radio.sent(), vec![vec![0x08, 0x00, 0x03, 0xC8, 0x42, 0x00, 0x00, 0x00]]);
        assert_eq!(
            target.ops(),
            vec![
                Op::Start(0x48, Direction::Write),
                Op::Write(0x00),
                Op::Stop,
                Op::Start(0x48, Direction::Read),
                Op::Stop,
            ]
        );
    }

    #[test]
    fn test_i2c_oversized_reply_is_rejected_without_bus_traffic() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = run(
            &shared,
            &target,
            dispatcher.on_frame_received(&[0x05, 0x04, 0xFF, 0xC8, 0x1F]),
        );
        assert_eq!(result, Err(ProtocolError::ResponseOverflow));

        assert_eq!(radio.sent(), vec![vec![0x05, 0x00, 0x04, 0xC8, 0x5F]]);
        assert!(target.ops().is_empty());
    }

    #[test]
    fn test_gpio_request_returns_inverted_pins() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let port = Port::default();
        port.0.set(0xF5);
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &port, &radio);

        let result = block_on(dispatcher.on_frame_received(&[0x24, 0x09, 0xFF, 0x82]));
        assert_eq!(result, Ok(()));
        assert_eq!(radio.sent(), vec![vec![0x25, 0x00, 0x09, 0x82, 0b1010]]);
    }

    #[test]
    fn test_gpio_unsupported_group_gets_error_reply() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = block_on(dispatcher.on_frame_received(&[0x24, 0x09, 0xFF, 0x83]));
        assert_eq!(result, Err(ProtocolError::UnsupportedGroup));

        let result = block_on(dispatcher.on_frame_received(&[0x24, 0x0A, 0xFF, 0x02]));
        assert_eq!(result, Err(ProtocolError::UnsupportedGroup));

        assert_eq!(
            radio.sent(),
            vec![vec![0x24, 0x00, 0x09, 0xC3], vec![0x24, 0x01, 0x0A, 0x42]]
        );
    }

    #[test]
    fn test_gpio_change_sends_one_notification() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let port = Port::default();
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &port, &radio);

        assert_eq!(block_on(dispatcher.poll_gpio()), Ok(()));
        assert!(radio.sent().is_empty());

        port.0.set(0b0101);
        assert_eq!(block_on(dispatcher.poll_gpio()), Ok(()));
        assert_eq!(block_on(dispatcher.poll_gpio()), Ok(()));

        assert_eq!(radio.sent(), vec![vec![0x25, 0x00, 0xFF, 0x02, 0b1010]]);
        assert_eq!(dispatcher.ownseq(), 1);
    }

    #[test]
    fn test_gpio_change_while_disconnected_is_not_replayed() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let port = Port::default();
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &port, &radio);
        dispatcher.on_link_close();

        port.0.set(0b0011);
        assert_eq!(block_on(dispatcher.poll_gpio()), Ok(()));

        dispatcher.on_link_open(ChannelId(0x42));
        assert_eq!(block_on(dispatcher.poll_gpio()), Ok(()));

        assert!(radio.sent().is_empty());
        assert_eq!(dispatcher.ownseq(), 0);
    }

    #[test]
    fn test_malformed_frames_are_dropped_silently() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        assert_eq!(
            block_on(dispatcher.on_frame_received(&[0x05, 0x01])),
            Err(ProtocolError::Frame(FrameError::Truncated))
        );
        assert_eq!(
            block_on(dispatcher.on_frame_received(&[0x03, 0x01, 0xFF])),
            Err(ProtocolError::Frame(FrameError::Truncated))
        );
        // Declares five bytes, carries four
        assert_eq!(
            block_on(dispatcher.on_frame_received(&[0x05, 0x00, 0xFF, 0x00])),
            Err(ProtocolError::Frame(FrameError::Truncated))
        );
        assert_eq!(
            block_on(dispatcher.on_frame_received(&[0x44, 0x01, 0xFF, 0x00])),
            Err(ProtocolError::UnknownOpType)
        );

        assert!(radio.sent().is_empty());
        assert!(target.ops().is_empty());
        assert_eq!(dispatcher.ownseq(), 0);
    }

    #[test]
    fn test_ownseq_increments_and_wraps() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        for seq in 0..=255u8 {
            let result = block_on(dispatcher.on_frame_received(&[0x24, seq, 0xFF, 0x82]));
            assert_eq!(result, Ok(()));
        }

        let sent = radio.sent();
        assert_eq!(sent.len(), 256);
        for (i, frame) in sent.iter().enumerate() {
            assert_eq!(usize::from(frame[1]), i % 255);
            assert_eq!(usize::from(frame[2]), i);
        }
        assert_eq!(dispatcher.ownseq(), 1);
    }

    #[test]
    fn test_send_failure_still_advances_ownseq() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        radio.fail.set(true);
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let result = block_on(dispatcher.on_frame_received(&[0x24, 0x01, 0xFF, 0x82]));
        assert_eq!(result, Err(ProtocolError::Transport(TransportError::Io)));
        assert_eq!(dispatcher.ownseq(), 1);
    }

    #[test]
    fn test_replies_dropped_while_disconnected() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        block_on(dispatcher.handle_event(LinkEvent::Closed)).unwrap();
        assert_eq!(dispatcher.link(), LinkState::Disconnected);

        let result = block_on(dispatcher.on_frame_received(&[0x24, 0x01, 0xFF, 0x82]));
        assert_eq!(result, Err(ProtocolError::Transport(TransportError::NotConnected)));
        assert_eq!(dispatcher.ownseq(), 0);

        block_on(dispatcher.handle_event(LinkEvent::Opened(ChannelId(7)))).unwrap();
        assert_eq!(dispatcher.link(), LinkState::Connected(ChannelId(7)));
    }

    #[test]
    fn test_data_event_is_dispatched() {
        let target = SimTarget::new(0x48);
        let shared = BusShared::new(target.clone());
        let radio = Radio::default();
        let mut dispatcher = connected(&shared, &Port::default(), &radio);

        let frame = bridge_proto::encode_to_vec(OpType::Gpio, 3, UNSOLICITED, &[0x82]).unwrap();
        let result = block_on(dispatcher.handle_event(LinkEvent::Data(ChannelId(0x41), frame)));
        assert_eq!(result, Ok(()));
        assert_eq!(radio.sent().len(), 1);
    }
}
