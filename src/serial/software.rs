//! Serial line synthesized from a timer, one output pin and one
//! edge-triggered input pin
//!
//! Transmit runs off a periodic bit timer: each tick shifts one bit of the
//! current frame onto the pin. Receive waits for the start edge, then
//! samples each bit from a second timer and leaves the finished byte in a
//! one-byte holding register for the poll loop.
//!
//! Everything the interrupt handlers touch lives in [`SoftSerialLink`]
//! behind a `critical_section::Mutex`. The poll side ([`SoftSerial`]) only
//! enters the same lock for a few instructions per call.

use core::cell::RefCell;

use critical_section::Mutex;
use log::{debug, warn};

use super::baud::{actual_baud, quantize};
use super::traits::{FrameFormat, LineStats, LinkSettings, SerialBackend};
use crate::buffer::SerialBuffers;
use crate::cdc::LineCoding;
use crate::config::clock::SOFT_TIMER_CLOCK_HZ;
use crate::config::soft_serial::{MAX_BAUD, MIN_BAUD};

/// Longest delay, in timer ticks, between a bit-timer compare and
/// [`SoftSerialLink::on_tx_tick`] running. Later service skews bit edges
/// by more than 1/16 of a bit at the fastest rate.
pub const TX_MAX_LATENCY_TICKS: u16 = 3;

/// Longest delay, in timer ticks, between the start edge and
/// [`SoftSerialLink::on_rx_edge`] running. The first sample is scheduled a
/// quarter bit early, so up to a quarter bit at the fastest rate keeps
/// every sample inside its bit.
pub const RX_MAX_LATENCY_TICKS: u16 = 13;

/// Bits shifted out per frame: start, eight data, stop
const FRAME_BITS: u8 = 10;

/// Bit-timer periods a frame occupies the shifter: every bit plus the
/// period that holds the stop bit on the line
const FRAME_TICKS: u8 = FRAME_BITS + 1;

/// Bit timing derived from the baud rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftTiming {
    /// 8-bit compare value; one bit lasts `compare + 1` ticks
    pub compare: u8,
    /// Ticks from the start edge to the first data sample
    pub first_sample: u16,
}

impl SoftTiming {
    pub fn for_baud(baud: u32) -> Self {
        let compare = quantize(SOFT_TIMER_CLOCK_HZ, baud, u8::MAX as u16) as u8;
        let bit = compare as u16 + 1;
        // 1.25 bit periods, at least one tick past the start bit
        let first_sample = (bit + bit / 4).max(bit + 1);
        Self {
            compare,
            first_sample,
        }
    }

    /// Ticks per bit
    pub const fn bit_ticks(&self) -> u16 {
        self.compare as u16 + 1
    }
}

/// Pins and timers behind the software link
pub trait SoftSerialHw {
    /// Drive the transmit pin
    fn set_tx_level(&mut self, high: bool);

    /// Sample the receive pin
    fn rx_level(&mut self) -> bool;

    /// Start the periodic transmit bit timer; first tick one period from now
    fn start_bit_timer(&mut self, period_ticks: u16);

    fn stop_bit_timer(&mut self);

    /// Interrupt on the next level change of the receive pin
    fn arm_rx_edge(&mut self);

    fn disarm_rx_edge(&mut self);

    /// First receive sample after `first_delay` ticks, then every `period`
    fn start_rx_sampling(&mut self, first_delay: u16, period: u16);

    fn stop_rx_sampling(&mut self);

    /// Clear the bit timer interrupt
    fn ack_tx_tick(&mut self) {}

    /// Clear the edge interrupt
    fn ack_rx_edge(&mut self) {}

    /// Clear the sample timer interrupt. The first call after
    /// [`start_rx_sampling`](Self::start_rx_sampling) is where a timer
    /// without a separate first-period setting switches to `period`.
    fn ack_rx_sample(&mut self) {}
}

/// MSB-first transmit shift register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TxShifter {
    shift: u16,
    /// Periods until the frame, stop bit included, is fully on the wire
    bits_left: u8,
}

impl TxShifter {
    const IDLE: Self = Self {
        shift: 0xFFFF,
        bits_left: 0,
    };

    /// Load a frame and return the start bit level.
    ///
    /// Data goes out LSB first, so the byte is reversed into the top of the
    /// register below the start bit, followed by stop and idle ones.
    fn load(&mut self, byte: u8) -> bool {
        self.shift = ((byte.reverse_bits() as u16) << 7) | 0x007F;
        self.bits_left = FRAME_TICKS;
        self.next_bit()
    }

    fn next_bit(&mut self) -> bool {
        let bit = self.shift & 0x8000 != 0;
        self.shift = (self.shift << 1) | 1;
        self.bits_left -= 1;
        bit
    }

    /// Next level to drive, or `None` once the frame is complete. The tick
    /// after the stop bit drives idle, which ends the stop bit period.
    fn tick(&mut self) -> Option<bool> {
        if self.bits_left == 0 {
            None
        } else {
            Some(self.next_bit())
        }
    }

    /// The stop bit has lasted a full period; a new frame may start
    fn is_idle(&self) -> bool {
        self.bits_left == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxSampler {
    /// Waiting for a start edge
    Idle,
    /// `bits` data bits collected so far, LSB first
    Receiving { bits: u8, shift: u8 },
}

struct LinkState<H> {
    hw: H,
    tx: TxShifter,
    rx: RxSampler,
    /// Completed byte waiting for the poll loop
    holding: Option<u8>,
    timing: SoftTiming,
    invert: bool,
    stats: LineStats,
}

impl<H: SoftSerialHw> LinkState<H> {
    fn drive(&mut self, level: bool) {
        self.hw.set_tx_level(level ^ self.invert);
    }

    fn sample(&mut self) -> bool {
        self.hw.rx_level() ^ self.invert
    }
}

/// Interrupt-shared half of the software serial link.
///
/// Meant to live in a `static`; [`attach`](Self::attach) hands it the
/// hardware once at startup.
pub struct SoftSerialLink<H> {
    state: Mutex<RefCell<Option<LinkState<H>>>>,
}

impl<H: SoftSerialHw> SoftSerialLink<H> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(None)),
        }
    }

    /// Take ownership of the pins and timers, idle the line and arm the
    /// receiver
    pub fn attach(&self, hw: H, invert: bool, timing: SoftTiming) {
        critical_section::with(|cs| {
            let mut state = LinkState {
                hw,
                tx: TxShifter::IDLE,
                rx: RxSampler::Idle,
                holding: None,
                timing,
                invert,
                stats: LineStats::default(),
            };
            state.drive(true);
            state.hw.arm_rx_edge();
            self.state.borrow_ref_mut(cs).replace(state);
        });
    }

    fn with<R>(&self, f: impl FnOnce(&mut LinkState<H>) -> R) -> Option<R> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// Bit timer interrupt. Must run within [`TX_MAX_LATENCY_TICKS`] of the
    /// compare match.
    pub fn on_tx_tick(&self) {
        self.with(|state| {
            state.hw.ack_tx_tick();
            match state.tx.tick() {
                Some(level) => state.drive(level),
                None => state.hw.stop_bit_timer(),
            }
        });
    }

    /// Receive pin edge interrupt. Must run within
    /// [`RX_MAX_LATENCY_TICKS`] of the start edge.
    pub fn on_rx_edge(&self) {
        self.with(|state| {
            state.hw.ack_rx_edge();
            if state.rx != RxSampler::Idle {
                return;
            }
            state.hw.disarm_rx_edge();
            let timing = state.timing;
            state
                .hw
                .start_rx_sampling(timing.first_sample, timing.bit_ticks());
            state.rx = RxSampler::Receiving { bits: 0, shift: 0 };
        });
    }

    /// Receive sample timer interrupt, one per bit after the start bit
    pub fn on_rx_sample(&self) {
        self.with(|state| {
            state.hw.ack_rx_sample();
            let RxSampler::Receiving { bits, shift } = state.rx else {
                state.hw.stop_rx_sampling();
                return;
            };
            let level = state.sample();

            if bits < 8 {
                state.rx = RxSampler::Receiving {
                    bits: bits + 1,
                    shift: (shift >> 1) | ((level as u8) << 7),
                };
                return;
            }

            // Stop bit
            state.hw.stop_rx_sampling();
            state.rx = RxSampler::Idle;
            state.hw.arm_rx_edge();

            if !level {
                state.stats.framing_errors = state.stats.framing_errors.wrapping_add(1);
            } else if state.holding.is_some() {
                state.stats.overruns = state.stats.overruns.wrapping_add(1);
            } else {
                state.holding = Some(shift);
            }
        });
    }
}

impl<H: SoftSerialHw> Default for SoftSerialLink<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll-loop half of the software serial link
pub struct SoftSerial<'a, H> {
    link: &'a SoftSerialLink<H>,
}

impl<'a, H: SoftSerialHw> SoftSerial<'a, H> {
    pub fn new(link: &'a SoftSerialLink<H>) -> Self {
        Self { link }
    }
}

impl<H: SoftSerialHw> SerialBackend for SoftSerial<'_, H> {
    fn configure(&mut self, coding: &LineCoding) -> LinkSettings {
        if !(MIN_BAUD..=MAX_BAUD).contains(&coding.baud) {
            warn!(
                "software serial limited to {}..={} baud, requested {}",
                MIN_BAUD, MAX_BAUD, coding.baud
            );
        }
        let format = FrameFormat::from_coding(coding);
        if format != FrameFormat::EIGHT_N_ONE {
            warn!("software serial only supports 8N1, ignoring {:?}", format);
        }

        let timing = SoftTiming::for_baud(coding.baud);
        // Takes effect at the next frame in either direction
        self.link.with(|state| state.timing = timing);

        let settings = LinkSettings {
            requested_baud: coding.baud,
            divisor: timing.compare as u16,
            actual_baud: actual_baud(SOFT_TIMER_CLOCK_HZ, timing.compare as u16),
            format: FrameFormat::EIGHT_N_ONE,
        };
        debug!(
            "software serial configured: {} baud (compare {})",
            settings.actual_baud, timing.compare
        );
        settings
    }

    fn poll<const IN: usize, const OUT: usize>(&mut self, buffers: &mut SerialBuffers<IN, OUT>) {
        // One short critical section: hand off the holding register and
        // start the next frame if the shifter is free
        self.link.with(|state| {
            if let Some(byte) = state.holding.take() {
                if buffers.inbound.enqueue(byte).is_err() {
                    state.stats.dropped_full = state.stats.dropped_full.wrapping_add(1);
                    buffers.flow.rts = false;
                }
            }

            if buffers.flow.cts && state.tx.is_idle() {
                if let Some(byte) = buffers.outbound.dequeue() {
                    let start = state.tx.load(byte);
                    state.drive(start);
                    let period = state.timing.bit_ticks();
                    state.hw.start_bit_timer(period);
                }
            }
        });
    }

    fn is_transmit_idle(&self) -> bool {
        self.link.with(|state| state.tx.is_idle()).unwrap_or(true)
    }

    fn stats(&self) -> LineStats {
        self.link.with(|state| state.stats).unwrap_or_default()
    }
}
