//! [`UartPeripheral`] over an esp-hal blocking UART
//!
//! The driver reports FIFO space but not an empty shift register, so the
//! transmitter counts as idle once every written frame has had time to
//! leave the line.

use esp_hal::uart::{Config, DataBits, Parity, RxError, StopBits, Uart};
use embassy_time::Instant;
use esp_hal::Blocking;
use log::{trace, warn};

use crate::serial::{FrameParity, LineError, LinkSettings, TxDrainClock, UartPeripheral};

pub struct EspUart<'d> {
    uart: Uart<'d, Blocking>,
    drain: TxDrainClock,
}

impl<'d> EspUart<'d> {
    pub fn new(uart: Uart<'d, Blocking>) -> Self {
        Self {
            uart,
            drain: TxDrainClock::new(),
        }
    }
}

impl UartPeripheral for EspUart<'_> {
    fn configure(&mut self, settings: &LinkSettings) {
        let format = settings.format;
        let data_bits = match format.data_bits {
            5 => DataBits::_5,
            6 => DataBits::_6,
            7 => DataBits::_7,
            _ => DataBits::_8,
        };
        let parity = match format.parity {
            FrameParity::None => Parity::None,
            FrameParity::Odd => Parity::Odd,
            FrameParity::Even => Parity::Even,
        };
        let stop_bits = if format.stop_bits == 2 {
            StopBits::_2
        } else {
            StopBits::_1
        };

        // The fractional baud generator reaches the requested rate directly
        let config = Config::default()
            .with_baudrate(settings.requested_baud)
            .with_data_bits(data_bits)
            .with_parity(parity)
            .with_stop_bits(stop_bits);
        if let Err(e) = self.uart.apply_config(&config) {
            warn!("uart rejected configuration: {:?}", e);
        }
        self.drain.configure(settings);
    }

    fn tx_ready(&mut self) -> bool {
        self.uart.write_ready()
    }

    fn write(&mut self, byte: u8) {
        match self.uart.write(&[byte]) {
            Ok(_) => self.drain.wrote(Instant::now().as_micros()),
            Err(e) => trace!("uart write failed: {:?}", e),
        }
    }

    fn tx_idle(&mut self) -> bool {
        self.drain.is_drained(Instant::now().as_micros())
    }

    fn rx_available(&mut self) -> bool {
        self.uart.read_ready()
    }

    fn read(&mut self) -> Result<u8, LineError> {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte) {
            Ok(_) => Ok(byte[0]),
            Err(RxError::FrameFormatViolated) => Err(LineError::Framing),
            Err(RxError::ParityMismatch) => Err(LineError::Parity),
            Err(_) => Err(LineError::Overrun),
        }
    }
}
