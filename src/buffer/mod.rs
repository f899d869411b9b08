//! Byte buffers between the USB transport and the serial line
//!
//! Two independent rings: inbound (serial line -> USB) and outbound
//! (USB -> serial line), plus the flow-control state that gates both ends.

pub mod flow;
pub mod ring;

pub use flow::{FlowControl, FlowThresholds};
pub use ring::{BufferFull, RingBuffer};

/// Buffers and flow state handed to a serial backend on every poll
pub struct SerialBuffers<const IN: usize, const OUT: usize> {
    /// Bytes received from the serial line, waiting for the host
    pub inbound: RingBuffer<IN>,
    /// Bytes from the host, waiting to be sent on the serial line
    pub outbound: RingBuffer<OUT>,
    pub flow: FlowControl,
}

impl<const IN: usize, const OUT: usize> SerialBuffers<IN, OUT> {
    pub const fn new(thresholds: FlowThresholds) -> Self {
        Self {
            inbound: RingBuffer::new(),
            outbound: RingBuffer::new(),
            flow: FlowControl::new(thresholds),
        }
    }

    /// Drop all queued data and return flow state to power-on
    pub fn reset(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.flow.reset();
    }
}
