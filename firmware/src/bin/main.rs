#![no_std]
#![no_main]

use defmt::{info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{Blocking, I2c};
use embassy_rp::peripherals::{I2C0, UART1};
use embassy_rp::uart::{Config as UartConfig, Uart};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Delay, Duration, Ticker};
use i2c_radio_bridge::{
    i2c_bus, BridgeConfig, Bridge, BusEngine, I2cInterruptHandler, LinkEvent, LinkMonitor,
    PollTicker, PortPins, ProtocolDispatcher, UartLinkRx, UartLinkTx, BUS, BUS_CONFIG,
    RADIO_CHANNEL,
};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
    I2C0_IRQ => I2cInterruptHandler;
});

const CONFIG: BridgeConfig = BridgeConfig::DEFAULT;

/// Depth of the link event queue.
const EVENT_QUEUE: usize = 4;

type EventChannel = Channel<CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE>;

/// Link events from the state and RX tasks to the bridge task.
/// A channel keeps open/close and data in arrival order.
static EVENTS: StaticCell<EventChannel> = StaticCell::new();

/// Keeps the HAL driver, and with it the pin configuration, alive.
static I2C: StaticCell<I2c<'static, I2C0, Blocking>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("I2C radio bridge starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let events: &'static EventChannel = EVENTS.init(Channel::new());

    // --- I2C Setup ---
    let i2c = i2c_bus::init(p.I2C0, p.PIN_5, p.PIN_4, Irqs, BUS_CONFIG);
    I2C.init(i2c);
    let engine = BusEngine::new(&BUS, Delay, CONFIG.bus_timeout_us);

    // --- UART Setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = 115_200;

    let uart = Uart::new(
        p.UART1,
        p.PIN_8, // TX
        p.PIN_9, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart_config,
    );
    let (tx, rx) = uart.split();

    // --- GPIO Setup ---
    let link_pin = Input::new(p.PIN_10, Pull::Down);
    let port = PortPins::new([
        Input::new(p.PIN_12, Pull::Up),
        Input::new(p.PIN_13, Pull::Up),
        Input::new(p.PIN_14, Pull::Up),
        Input::new(p.PIN_15, Pull::Up),
    ]);
    let led = Output::new(p.PIN_25, Level::Low);

    let bridge = ProtocolDispatcher::new(engine, port, UartLinkTx::new(tx), CONFIG);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(link_state_task(LinkMonitor::new(link_pin), events.sender()).unwrap());
    spawner.spawn(link_rx_task(UartLinkRx::new(rx), events.sender()).unwrap());
    spawner.spawn(bridge_task(bridge, events.receiver()).unwrap());
    spawner.spawn(heartbeat_task(led).unwrap());

    info!("I2C radio bridge initialized, waiting for a peer...");
}

/// Link state task - reports the radio module's connection changes.
#[embassy_executor::task]
async fn link_state_task(
    mut monitor: LinkMonitor<Input<'static>>,
    events: Sender<'static, CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE>,
) {
    loop {
        let event = monitor.next().await;
        events.send(event).await;
    }
}

/// Link RX task - assembles frames from the UART and queues them.
#[embassy_executor::task]
async fn link_rx_task(
    mut rx: UartLinkRx<'static>,
    events: Sender<'static, CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE>,
) {
    loop {
        match rx.receive_frame().await {
            Ok(frame) => events.send(LinkEvent::Data(RADIO_CHANNEL, frame)).await,
            Err(e) => warn!("UART receive error: {}", e),
        }
    }
}

/// Bridge task - serves frames and polls the input pins.
#[embassy_executor::task]
async fn bridge_task(
    mut bridge: Bridge,
    mut events: Receiver<'static, CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE>,
) {
    let mut ticker = PollTicker::new(&CONFIG);
    bridge.run(&mut events, &mut ticker).await
}

/// Heartbeat task - toggles the LED while the firmware is alive.
#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static>) {
    let mut ticker = Ticker::every(Duration::from_millis(500));
    loop {
        led.toggle();
        ticker.next().await;
    }
}
