#![no_std]
#![no_main]

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::{Builder, UsbDevice};
use esp_backtrace as _;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::otg_fs::asynch::{Config as OtgConfig, Driver};
use esp_hal::otg_fs::Usb;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;

use cdc_uart_bridge_firmware::config::usb::{MAX_PACKET_SIZE, PID, VID};
use cdc_uart_bridge_firmware::config::board::{self, BoardProfile};
use cdc_uart_bridge_firmware::serial::GpioControlLines;
use cdc_uart_bridge_firmware::usb::cdc_io::CdcControlHandler;
use cdc_uart_bridge_firmware::usb::{PacketTransport, USB_PIPES};
use cdc_uart_bridge_firmware::{bridge, tasks};

/// Modem-control pins: RTS out, DTR out, CTS in
type Lines = GpioControlLines<Output<'static>, Output<'static>, Input<'static>>;

#[cfg(not(feature = "soft-serial"))]
type ActiveBridge = bridge::HardwareBridge<cdc_uart_bridge_firmware::board::EspUart<'static>>;

#[cfg(feature = "soft-serial")]
type ActiveBridge =
    bridge::SoftwareBridge<'static, cdc_uart_bridge_firmware::board::EspSoftSerialHw>;

#[cfg(not(feature = "soft-serial"))]
const PROFILE: BoardProfile = board::HARDWARE;

#[cfg(feature = "soft-serial")]
const PROFILE: BoardProfile = board::SOFTWARE;

/// Full-speed bulk endpoints are at least 8 bytes; smaller board packets
/// are cut out of them by the transport
const ENDPOINT_PACKET_SIZE: u16 = 8;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// USB stack storage (needs 'static lifetime)
static EP_OUT_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 0]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; MAX_PACKET_SIZE]> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();
static CONTROL_HANDLER: StaticCell<CdcControlHandler> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // USB OTG: CDC ACM device on GPIO19 (D-) / GPIO20 (D+)
    let usb = Usb::new(peripherals.USB0, peripherals.GPIO20, peripherals.GPIO19);
    let driver = Driver::new(usb, EP_OUT_BUFFER.init([0; 1024]), OtgConfig::default());

    let mut usb_config = embassy_usb::Config::new(VID, PID);
    usb_config.manufacturer = Some("cdc232");
    usb_config.product = Some("USB-Serial Bridge");
    usb_config.max_packet_size_0 = MAX_PACKET_SIZE as u8;
    usb_config.max_power = 100;

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([]),
        CONTROL_BUF.init([0; MAX_PACKET_SIZE]),
    );
    // Ahead of the class, so line coding requests are validated by us
    builder.handler(CONTROL_HANDLER.init(CdcControlHandler::new(&USB_PIPES, PROFILE.default_baud)));
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), ENDPOINT_PACKET_SIZE);
    let (sender, receiver) = class.split();
    let device = builder.build();

    // Modem-control lines: RTS on GPIO4, CTS on GPIO5, DTR on GPIO6
    let rts = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());
    let dtr = Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default());
    let cts = Input::new(peripherals.GPIO5, InputConfig::default().with_pull(Pull::Up));
    let lines = GpioControlLines::new(rts, dtr, cts);

    // Serial line: TX on GPIO17, RX on GPIO18
    #[cfg(not(feature = "soft-serial"))]
    let bridge: ActiveBridge = {
        use cdc_uart_bridge_firmware::board::EspUart;
        use cdc_uart_bridge_firmware::serial::HardwareSerial;
        use esp_hal::uart::{Config as UartConfig, Uart};

        let uart = Uart::new(peripherals.UART1, UartConfig::default())
            .expect("Failed to initialise UART1")
            .with_tx(peripherals.GPIO17)
            .with_rx(peripherals.GPIO18);
        bridge::Bridge::new(HardwareSerial::new(EspUart::new(uart)), &PROFILE)
    };

    #[cfg(feature = "soft-serial")]
    let bridge: ActiveBridge = {
        use cdc_uart_bridge_firmware::board::{rx_edge_isr, EspSoftSerialHw, SOFT_LINK};
        use cdc_uart_bridge_firmware::config::soft_serial::INVERT;
        use cdc_uart_bridge_firmware::serial::{SoftSerial, SoftTiming};
        use esp_hal::gpio::Io;
        use esp_hal::timer::PeriodicTimer;

        let mut io = Io::new(peripherals.IO_MUX);
        io.set_interrupt_handler(rx_edge_isr);

        let idle = if INVERT { Level::Low } else { Level::High };
        let tx = Output::new(peripherals.GPIO17, idle, OutputConfig::default());
        let rx = Input::new(peripherals.GPIO18, InputConfig::default().with_pull(Pull::Up));
        let timg1 = TimerGroup::new(peripherals.TIMG1);
        let hw = EspSoftSerialHw::new(
            tx,
            rx,
            PeriodicTimer::new(timg1.timer0),
            PeriodicTimer::new(timg1.timer1),
        );
        SOFT_LINK.attach(hw, INVERT, SoftTiming::for_baud(PROFILE.default_baud));
        bridge::Bridge::new(SoftSerial::new(&SOFT_LINK), &PROFILE)
    };

    let transport = PacketTransport::new(&USB_PIPES, PROFILE.bulk_out);

    info!(
        "bridge up: {} baud, {} / {} byte buffers",
        PROFILE.default_baud, PROFILE.inbound_capacity, PROFILE.outbound_capacity
    );

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(usb_device_task(device, sender, receiver));
        spawner.must_spawn(bridge_poll_task(bridge, transport, lines));
    })
}

/// Task that runs the USB device and the CDC endpoint pumps
#[embassy_executor::task]
async fn usb_device_task(
    device: UsbDevice<'static, Driver<'static>>,
    sender: Sender<'static, Driver<'static>>,
    receiver: Receiver<'static, Driver<'static>>,
) {
    tasks::usb_task(device, sender, receiver, &USB_PIPES).await;
}

/// Task that runs the bridge poll loop
#[embassy_executor::task]
async fn bridge_poll_task(bridge: ActiveBridge, transport: PacketTransport<'static>, lines: Lines) {
    // The USB PHY runs from the crystal, so there is no oscillator to retune
    tasks::bridge_task(bridge, transport, lines, ()).await;
}
