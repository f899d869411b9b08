//! [`SoftSerialHw`] on two GPIOs and two timer-group timers
//!
//! The bit timer and the sample timer count in microseconds; tick counts
//! from the link are converted at the link's nominal timer clock.

use esp_hal::gpio::{Event, Input, Level, Output};
use esp_hal::handler;
use esp_hal::time::Duration;
use esp_hal::timer::PeriodicTimer;
use esp_hal::Blocking;

use crate::config::clock::SOFT_TIMER_CLOCK_HZ;
use crate::serial::{SoftSerialHw, SoftSerialLink};

/// Software link shared with the interrupt handlers below
pub static SOFT_LINK: SoftSerialLink<EspSoftSerialHw> = SoftSerialLink::new();

pub struct EspSoftSerialHw {
    tx: Output<'static>,
    rx: Input<'static>,
    bit_timer: PeriodicTimer<'static, Blocking>,
    sample_timer: PeriodicTimer<'static, Blocking>,
    /// Sample period to switch to after the first (longer) sample delay
    sample_period: Option<u16>,
}

impl EspSoftSerialHw {
    /// Wire up interrupt handlers; the timers are stopped until needed
    pub fn new(
        tx: Output<'static>,
        rx: Input<'static>,
        mut bit_timer: PeriodicTimer<'static, Blocking>,
        mut sample_timer: PeriodicTimer<'static, Blocking>,
    ) -> Self {
        bit_timer.set_interrupt_handler(bit_timer_isr);
        sample_timer.set_interrupt_handler(sample_timer_isr);
        Self {
            tx,
            rx,
            bit_timer,
            sample_timer,
            sample_period: None,
        }
    }
}

fn ticks_to_duration(ticks: u16) -> Duration {
    Duration::from_micros(ticks as u64 * 1_000_000 / SOFT_TIMER_CLOCK_HZ as u64)
}

impl SoftSerialHw for EspSoftSerialHw {
    fn set_tx_level(&mut self, high: bool) {
        self.tx.set_level(Level::from(high));
    }

    fn rx_level(&mut self) -> bool {
        self.rx.is_high()
    }

    fn start_bit_timer(&mut self, period_ticks: u16) {
        let _ = self.bit_timer.start(ticks_to_duration(period_ticks));
        self.bit_timer.listen();
    }

    fn stop_bit_timer(&mut self) {
        self.bit_timer.unlisten();
        let _ = self.bit_timer.cancel();
    }

    fn arm_rx_edge(&mut self) {
        self.rx.clear_interrupt();
        self.rx.listen(Event::AnyEdge);
    }

    fn disarm_rx_edge(&mut self) {
        self.rx.unlisten();
    }

    fn start_rx_sampling(&mut self, first_delay: u16, period: u16) {
        self.sample_period = Some(period);
        let _ = self.sample_timer.start(ticks_to_duration(first_delay));
        self.sample_timer.listen();
    }

    fn stop_rx_sampling(&mut self) {
        self.sample_period = None;
        self.sample_timer.unlisten();
        let _ = self.sample_timer.cancel();
    }

    fn ack_tx_tick(&mut self) {
        self.bit_timer.clear_interrupt();
    }

    fn ack_rx_edge(&mut self) {
        self.rx.clear_interrupt();
    }

    fn ack_rx_sample(&mut self) {
        self.sample_timer.clear_interrupt();
        if let Some(period) = self.sample_period.take() {
            let _ = self.sample_timer.start(ticks_to_duration(period));
        }
    }
}

#[handler]
fn bit_timer_isr() {
    SOFT_LINK.on_tx_tick();
}

#[handler]
fn sample_timer_isr() {
    SOFT_LINK.on_rx_sample();
}

/// GPIO bank handler; install with `Io::set_interrupt_handler`
#[handler]
pub fn rx_edge_isr() {
    SOFT_LINK.on_rx_edge();
}
