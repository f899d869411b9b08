//! Serial backend contract and hardware seams
//!
//! The bridge drives either backend through [`SerialBackend`]. The hardware
//! backend sits on a [`UartPeripheral`]; modem-control signals go through
//! [`ControlLines`] so both backends share one pin driver.

use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

use crate::buffer::SerialBuffers;
use crate::cdc::{LineCoding, Parity, StopBits};

/// Errors flagged by the receiver for one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Stop bit sampled low
    Framing,
    /// Parity bit mismatch
    Parity,
    /// Byte arrived before the previous one was collected
    Overrun,
}

/// Parity the backends can generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameParity {
    None,
    Odd,
    Even,
}

/// Character frame actually programmed into a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// 5 to 8
    pub data_bits: u8,
    pub parity: FrameParity,
    /// 1 or 2
    pub stop_bits: u8,
}

impl FrameFormat {
    /// Plain 8N1
    pub const EIGHT_N_ONE: Self = Self {
        data_bits: 8,
        parity: FrameParity::None,
        stop_bits: 1,
    };

    /// Closest frame a UART can produce for `coding`.
    ///
    /// Mark and space parity fall back to none, 1.5 stop bits to two and
    /// 16 data bits to eight.
    pub fn from_coding(coding: &LineCoding) -> Self {
        let parity = match coding.parity {
            Parity::None => FrameParity::None,
            Parity::Odd => FrameParity::Odd,
            Parity::Even => FrameParity::Even,
            Parity::Mark | Parity::Space => {
                warn!("{:?} parity not supported, using none", coding.parity);
                FrameParity::None
            }
        };
        let stop_bits = match coding.stop_bits {
            StopBits::One => 1,
            StopBits::OnePointFive | StopBits::Two => 2,
        };
        let data_bits = if coding.data_bits > 8 {
            warn!("{} data bits not supported, using 8", coding.data_bits);
            8
        } else {
            coding.data_bits
        };
        Self {
            data_bits,
            parity,
            stop_bits,
        }
    }
}

/// What a backend ended up configuring for a line coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Rate the host asked for
    pub requested_baud: u32,
    /// Bit-period divisor programmed into the hardware
    pub divisor: u16,
    /// Rate the divisor produces
    pub actual_baud: u32,
    pub format: FrameFormat,
}

/// Drop counters; never change behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub framing_errors: u32,
    pub parity_errors: u32,
    pub overruns: u32,
    /// Bytes received while the inbound buffer had no room
    pub dropped_full: u32,
}

impl LineStats {
    pub fn record(&mut self, error: LineError) {
        let counter = match error {
            LineError::Framing => &mut self.framing_errors,
            LineError::Parity => &mut self.parity_errors,
            LineError::Overrun => &mut self.overruns,
        };
        *counter = counter.wrapping_add(1);
    }

    /// Sum of all dropped bytes
    pub fn total_dropped(&self) -> u32 {
        self.framing_errors
            .wrapping_add(self.parity_errors)
            .wrapping_add(self.overruns)
            .wrapping_add(self.dropped_full)
    }
}

/// A byte-moving serial backend polled from the main loop
pub trait SerialBackend {
    /// Apply a new line coding; returns what was actually programmed
    fn configure(&mut self, coding: &LineCoding) -> LinkSettings;

    /// Move bytes between the buffers and the line.
    ///
    /// Transmits only while CTS is asserted. May deassert RTS when the
    /// inbound buffer is full; never reasserts it.
    fn poll<const IN: usize, const OUT: usize>(&mut self, buffers: &mut SerialBuffers<IN, OUT>);

    /// No byte is being shifted out
    fn is_transmit_idle(&self) -> bool;

    fn stats(&self) -> LineStats;
}

/// On-chip UART with a one-byte transmit and receive register
pub trait UartPeripheral {
    fn configure(&mut self, settings: &LinkSettings);

    /// Transmit data register can take a byte
    fn tx_ready(&mut self) -> bool;

    fn write(&mut self, byte: u8);

    /// Last byte has left the shift register
    fn tx_idle(&mut self) -> bool;

    /// A received byte (possibly flagged with an error) is waiting
    fn rx_available(&mut self) -> bool;

    /// Take the waiting byte; error flags are reported instead of the data
    fn read(&mut self) -> Result<u8, LineError>;
}

/// Modem-control pins toward the serial peer
pub trait ControlLines {
    fn set_rts(&mut self, asserted: bool);

    fn set_dtr(&mut self, asserted: bool);

    /// Peer's clear-to-send
    fn cts(&mut self) -> bool;
}

/// [`ControlLines`] over three GPIOs, high meaning asserted
pub struct GpioControlLines<R, D, C> {
    rts: R,
    dtr: D,
    cts: C,
}

impl<R, D, C> GpioControlLines<R, D, C>
where
    R: OutputPin,
    D: OutputPin,
    C: InputPin,
{
    pub fn new(rts: R, dtr: D, cts: C) -> Self {
        Self { rts, dtr, cts }
    }
}

impl<R, D, C> ControlLines for GpioControlLines<R, D, C>
where
    R: OutputPin,
    D: OutputPin,
    C: InputPin,
{
    fn set_rts(&mut self, asserted: bool) {
        let _ = if asserted {
            self.rts.set_high()
        } else {
            self.rts.set_low()
        };
    }

    fn set_dtr(&mut self, asserted: bool) {
        let _ = if asserted {
            self.dtr.set_high()
        } else {
            self.dtr.set_low()
        };
    }

    fn cts(&mut self) -> bool {
        // An unreadable pin must not stall transmission
        self.cts.is_high().unwrap_or(true)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    struct Pin {
        high: bool,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    impl InputPin for Pin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.high)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.high)
        }
    }

    #[test]
    fn test_frame_format_fallbacks() {
        let coding = LineCoding {
            baud: 9600,
            stop_bits: StopBits::OnePointFive,
            parity: Parity::Mark,
            data_bits: 16,
        };
        assert_eq!(
            FrameFormat::from_coding(&coding),
            FrameFormat {
                data_bits: 8,
                parity: FrameParity::None,
                stop_bits: 2
            }
        );
    }

    #[test]
    fn test_frame_format_7e1() {
        let coding = LineCoding {
            baud: 9600,
            stop_bits: StopBits::One,
            parity: Parity::Even,
            data_bits: 7,
        };
        let format = FrameFormat::from_coding(&coding);
        assert_eq!(format.data_bits, 7);
        assert_eq!(format.parity, FrameParity::Even);
        assert_eq!(format.stop_bits, 1);
    }

    #[test]
    fn test_line_stats() {
        let mut stats = LineStats::default();
        stats.record(LineError::Framing);
        stats.record(LineError::Parity);
        stats.record(LineError::Parity);
        stats.dropped_full = 1;
        assert_eq!(stats.parity_errors, 2);
        assert_eq!(stats.total_dropped(), 4);
    }

    #[test]
    fn test_gpio_control_lines() {
        let mut lines = GpioControlLines::new(
            Pin { high: false },
            Pin { high: false },
            Pin { high: false },
        );
        lines.set_rts(true);
        lines.set_dtr(true);
        assert!(lines.rts.high);
        assert!(lines.dtr.high);
        assert!(!lines.cts());

        lines.set_rts(false);
        assert!(!lines.rts.high);
    }
}
