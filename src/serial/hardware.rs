//! Serial backend on the on-chip UART
//!
//! Each poll fills the transmit register while the peer allows it and
//! drains received bytes into the inbound buffer. Bytes flagged with a
//! line error are dropped.

use log::{debug, trace, warn};

use super::baud::{actual_baud, error_per_mille, quantize, MAX_ERROR_PER_MILLE};
use super::traits::{
    FrameFormat, FrameParity, LineStats, LinkSettings, SerialBackend, UartPeripheral,
};
use crate::buffer::SerialBuffers;
use crate::cdc::LineCoding;
use crate::config::clock::UART_DIVISOR_CLOCK_HZ;

/// Widest divisor the baud generator accepts (12 bits)
pub const MAX_DIVISOR: u16 = 0x0FFF;

pub struct HardwareSerial<U: UartPeripheral> {
    uart: U,
    stats: LineStats,
    /// Transmitter state sampled at the end of the last poll
    tx_idle: bool,
}

impl<U: UartPeripheral> HardwareSerial<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            stats: LineStats::default(),
            tx_idle: true,
        }
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }
}

impl<U: UartPeripheral> SerialBackend for HardwareSerial<U> {
    fn configure(&mut self, coding: &LineCoding) -> LinkSettings {
        let divisor = quantize(UART_DIVISOR_CLOCK_HZ, coding.baud, MAX_DIVISOR);
        let settings = LinkSettings {
            requested_baud: coding.baud,
            divisor,
            actual_baud: actual_baud(UART_DIVISOR_CLOCK_HZ, divisor),
            format: FrameFormat::from_coding(coding),
        };

        if error_per_mille(UART_DIVISOR_CLOCK_HZ, coding.baud, divisor) > MAX_ERROR_PER_MILLE {
            warn!(
                "baud {} not reachable, running at {}",
                coding.baud, settings.actual_baud
            );
        }
        debug!(
            "uart configured: {} baud (divisor {}), {:?}",
            settings.actual_baud, divisor, settings.format
        );

        self.uart.configure(&settings);
        settings
    }

    fn poll<const IN: usize, const OUT: usize>(&mut self, buffers: &mut SerialBuffers<IN, OUT>) {
        while buffers.flow.cts && self.uart.tx_ready() {
            match buffers.outbound.dequeue() {
                Some(byte) => self.uart.write(byte),
                None => break,
            }
        }

        while self.uart.rx_available() {
            if buffers.inbound.is_full() {
                // Leave the byte in the peripheral until the host catches up
                buffers.flow.rts = false;
                break;
            }
            match self.uart.read() {
                Ok(byte) => {
                    if buffers.inbound.enqueue(byte).is_err() {
                        self.stats.dropped_full = self.stats.dropped_full.wrapping_add(1);
                    }
                }
                Err(error) => {
                    trace!("dropped received byte: {:?}", error);
                    self.stats.record(error);
                }
            }
        }

        self.tx_idle = buffers.outbound.is_empty() && self.uart.tx_idle();
    }

    fn is_transmit_idle(&self) -> bool {
        self.tx_idle
    }

    fn stats(&self) -> LineStats {
        self.stats
    }
}

/// When the last written byte leaves the line, for peripherals that only
/// report FIFO space and not an empty shift register.
///
/// Times are microseconds on any monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct TxDrainClock {
    frame_us: u64,
    drained_at: u64,
}

impl TxDrainClock {
    pub const fn new() -> Self {
        Self {
            frame_us: 0,
            drained_at: 0,
        }
    }

    /// Frame length for the new link settings
    pub fn configure(&mut self, settings: &LinkSettings) {
        let format = settings.format;
        let parity = u64::from(format.parity != FrameParity::None);
        let bits = 1 + u64::from(format.data_bits) + parity + u64::from(format.stop_bits);
        self.frame_us = (bits * 1_000_000).div_ceil(u64::from(settings.actual_baud.max(1)));
    }

    /// A byte was queued at `now`; it goes out after everything before it
    pub fn wrote(&mut self, now: u64) {
        self.drained_at = self.drained_at.max(now) + self.frame_us;
    }

    pub fn is_drained(&self, now: u64) -> bool {
        now >= self.drained_at
    }
}

impl Default for TxDrainClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FlowThresholds;
    use crate::cdc::{Parity, StopBits};
    use crate::config::board;
    use crate::serial::traits::mock::MockUart;
    use crate::serial::traits::LineError;

    type Buffers = SerialBuffers<16, 32>;

    fn buffers() -> Buffers {
        SerialBuffers::new(FlowThresholds::from_profile(&board::HARDWARE))
    }

    #[test]
    fn test_configure_9600() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let settings = serial.configure(&LineCoding::new(9600));

        assert_eq!(settings.divisor, 214);
        assert_eq!(settings.format, FrameFormat::EIGHT_N_ONE);
        assert_eq!(serial.uart().configured(), Some(settings));
    }

    #[test]
    fn test_configure_space_parity_falls_back() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let settings = serial.configure(&LineCoding {
            baud: 19200,
            stop_bits: StopBits::Two,
            parity: Parity::Space,
            data_bits: 7,
        });

        assert_eq!(settings.format.parity, FrameParity::None);
        assert_eq!(settings.format.stop_bits, 2);
        assert_eq!(settings.format.data_bits, 7);
    }

    #[test]
    fn test_transmit_drains_outbound() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let mut buffers = buffers();
        buffers.outbound.extend_from_slice(b"hello").unwrap();

        serial.poll(&mut buffers);

        assert_eq!(serial.uart().tx_data(), b"hello");
        assert!(buffers.outbound.is_empty());
    }

    #[test]
    fn test_transmit_waits_for_register() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let mut buffers = buffers();
        buffers.outbound.extend_from_slice(b"abcd").unwrap();
        serial.uart().set_tx_room(1);

        serial.poll(&mut buffers);
        assert_eq!(serial.uart().tx_data(), b"a");
        assert_eq!(buffers.outbound.used(), 3);

        serial.uart().set_tx_room(8);
        serial.poll(&mut buffers);
        assert_eq!(serial.uart().tx_data(), b"abcd");
    }

    #[test]
    fn test_transmit_paused_by_cts() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let mut buffers = buffers();
        buffers.outbound.extend_from_slice(b"xy").unwrap();
        buffers.flow.cts = false;

        serial.poll(&mut buffers);
        assert!(serial.uart().tx_data().is_empty());

        buffers.flow.cts = true;
        serial.poll(&mut buffers);
        assert_eq!(serial.uart().tx_data(), b"xy");
    }

    #[test]
    fn test_receive_drops_flagged_bytes() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let mut buffers = buffers();
        serial.uart().queue_rx(b"a");
        serial.uart().queue_rx_error(LineError::Framing);
        serial.uart().queue_rx(b"b");
        serial.uart().queue_rx_error(LineError::Parity);
        serial.uart().queue_rx_error(LineError::Overrun);

        serial.poll(&mut buffers);

        assert_eq!(buffers.inbound.dequeue(), Some(b'a'));
        assert_eq!(buffers.inbound.dequeue(), Some(b'b'));
        assert!(buffers.inbound.is_empty());

        let stats = serial.stats();
        assert_eq!(stats.framing_errors, 1);
        assert_eq!(stats.parity_errors, 1);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn test_full_inbound_leaves_byte_and_drops_rts() {
        let mut serial = HardwareSerial::new(MockUart::new());
        let mut buffers = buffers();
        serial.uart().queue_rx(&[0x55; 20]);

        serial.poll(&mut buffers);

        // 16-slot ring holds 15
        assert!(buffers.inbound.is_full());
        assert_eq!(serial.uart().rx_pending(), 5);
        assert!(!buffers.flow.rts);
        assert_eq!(serial.stats().total_dropped(), 0);
    }

    fn settings_8n1(baud: u32) -> LinkSettings {
        LinkSettings {
            requested_baud: baud,
            divisor: 0,
            actual_baud: baud,
            format: FrameFormat::EIGHT_N_ONE,
        }
    }

    #[test]
    fn test_drain_clock_queues_frames_back_to_back() {
        let mut clock = TxDrainClock::new();
        // 10 bits at 9600 baud
        clock.configure(&settings_8n1(9600));
        assert!(clock.is_drained(0));

        clock.wrote(100);
        clock.wrote(100);
        clock.wrote(100);
        assert!(!clock.is_drained(100 + 2 * 1042));
        assert!(clock.is_drained(100 + 3 * 1042));
    }

    #[test]
    fn test_drain_clock_after_idle_gap() {
        let mut clock = TxDrainClock::new();
        clock.configure(&settings_8n1(9600));
        clock.wrote(0);
        clock.wrote(50_000);
        assert!(!clock.is_drained(50_000 + 1041));
        assert!(clock.is_drained(50_000 + 1042));
    }

    #[test]
    fn test_drain_clock_counts_parity_and_stop_bits() {
        let mut clock = TxDrainClock::new();
        let mut settings = settings_8n1(1000);
        settings.format = FrameFormat {
            data_bits: 7,
            parity: FrameParity::Even,
            stop_bits: 2,
        };
        clock.configure(&settings);
        clock.wrote(0);
        // 1 + 7 + 1 + 2 bits of 1 ms
        assert!(!clock.is_drained(10_999));
        assert!(clock.is_drained(11_000));
    }
}
