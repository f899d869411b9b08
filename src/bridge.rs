//! USB CDC <-> serial line bridge
//!
//! Owns the ring buffers, the line coding and the selected serial backend.
//! One [`Bridge::poll`] call is one iteration of the event loop:
//!
//! 1. sample CTS from the peer
//! 2. pull host packets while the OUT gate is open
//! 3. let the backend move bytes to and from the line
//! 4. send at most one IN report to the host
//! 5. recompute the OUT gate and RTS, then drive the control pins
//!
//! Backpressure is always applied before a buffer can overflow, so a
//! failed enqueue of host data is a logic error and panics.

use log::{debug, warn};

use crate::buffer::{FlowThresholds, SerialBuffers};
use crate::cdc::requests::CONTROL_LINE_DTR;
use crate::cdc::{ClassRequest, LineCoding, LineCodingError, SetupPacket};
use crate::config::board::{
    BoardProfile, HARDWARE_INBOUND, HARDWARE_OUTBOUND, SOFTWARE_INBOUND, SOFTWARE_OUTBOUND,
};
use crate::config::usb::{LINE_CODING_LEN, MAX_PACKET_SIZE};
use crate::serial::{
    ControlLines, HardwareSerial, LineStats, LinkSettings, SerialBackend, SoftSerial,
};
use crate::usb::UsbTransport;

/// Bridge over the on-chip UART, sized for the hardware board
pub type HardwareBridge<U> = Bridge<HardwareSerial<U>, HARDWARE_INBOUND, HARDWARE_OUTBOUND>;

/// Bridge over the software serial link, sized for the software board
pub type SoftwareBridge<'a, H> = Bridge<SoftSerial<'a, H>, SOFTWARE_INBOUND, SOFTWARE_OUTBOUND>;

/// Answer to a class request on the control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// Status stage only
    Accepted,
    /// Data stage for GET_LINE_CODING
    Data([u8; LINE_CODING_LEN]),
    /// Stall the request
    Rejected,
}

pub struct Bridge<B, const IN: usize, const OUT: usize> {
    backend: B,
    buffers: SerialBuffers<IN, OUT>,
    profile: BoardProfile,
    /// Bytes of the last accepted SET_LINE_CODING, echoed verbatim
    line_coding: [u8; LINE_CODING_LEN],
    settings: LinkSettings,
    /// The last IN report was full and drained the buffer
    send_empty: bool,
    /// Pin levels last written, `None` forces a write
    applied_rts: Option<bool>,
    applied_dtr: Option<bool>,
}

impl<B: SerialBackend, const IN: usize, const OUT: usize> Bridge<B, IN, OUT> {
    /// Bridge with the profile's default line coding applied.
    ///
    /// # Panics
    ///
    /// Panics if the buffer sizes or packet sizes do not match `profile`.
    pub fn new(mut backend: B, profile: &BoardProfile) -> Self {
        assert!(
            IN == profile.inbound_capacity && OUT == profile.outbound_capacity,
            "buffer sizes do not match the board profile"
        );
        assert!(
            profile.bulk_in <= MAX_PACKET_SIZE && profile.bulk_out <= MAX_PACKET_SIZE,
            "packet size exceeds the endpoint maximum"
        );

        let coding = LineCoding::new(profile.default_baud);
        let settings = backend.configure(&coding);
        Self {
            backend,
            buffers: SerialBuffers::new(FlowThresholds::from_profile(profile)),
            profile: *profile,
            line_coding: coding.to_bytes(),
            settings,
            send_empty: false,
            applied_rts: None,
            applied_dtr: None,
        }
    }

    /// Dispatch a CDC class request. `data` is the OUT data stage, empty
    /// for requests without one.
    pub fn handle_control(&mut self, setup: &SetupPacket, data: &[u8]) -> ControlResponse {
        match ClassRequest::parse(setup) {
            ClassRequest::SetLineCoding => match self.set_line_coding(data) {
                Ok(_) => ControlResponse::Accepted,
                Err(e) => {
                    warn!("line coding rejected: {:?}", e);
                    ControlResponse::Rejected
                }
            },
            ClassRequest::GetLineCoding => ControlResponse::Data(self.line_coding()),
            ClassRequest::SetControlLineState(value) => {
                self.set_control_line_state(value);
                ControlResponse::Accepted
            }
            ClassRequest::Unsupported(request) => {
                debug!("unsupported control request 0x{:02x}", request);
                ControlResponse::Rejected
            }
        }
    }

    /// SET_LINE_CODING. A malformed payload leaves the current
    /// configuration untouched.
    pub fn set_line_coding(&mut self, payload: &[u8]) -> Result<LinkSettings, LineCodingError> {
        let coding = LineCoding::parse(payload)?;
        self.settings = self.backend.configure(&coding);
        self.line_coding.copy_from_slice(payload);
        Ok(self.settings)
    }

    /// GET_LINE_CODING: the bytes last set, even if the rate was rounded
    pub fn line_coding(&self) -> [u8; LINE_CODING_LEN] {
        self.line_coding
    }

    /// SET_CONTROL_LINE_STATE: bit 0 drives DTR on the next poll
    pub fn set_control_line_state(&mut self, value: u16) {
        self.buffers.flow.dtr = value & CONTROL_LINE_DTR != 0;
    }

    /// Queue one bulk OUT packet and close the gate if another would not fit.
    ///
    /// # Panics
    ///
    /// Panics if the packet does not fit; the gate must have been closed.
    pub fn on_bulk_out<U: UsbTransport>(&mut self, usb: &mut U, data: &[u8]) {
        if self.buffers.outbound.extend_from_slice(data).is_err() {
            panic!(
                "outbound overflow: {} byte packet with {} bytes free",
                data.len(),
                self.buffers.outbound.free()
            );
        }
        if !self.buffers.flow.out_gate(true, self.buffers.outbound.free()) {
            usb.set_out_enabled(false);
        }
    }

    /// One event-loop iteration
    pub fn poll<U, L>(&mut self, usb: &mut U, lines: &mut L)
    where
        U: UsbTransport,
        L: ControlLines,
    {
        self.buffers.flow.cts = lines.cts();

        let mut packet = [0u8; MAX_PACKET_SIZE];
        while usb.out_enabled() {
            match usb.receive_out(&mut packet) {
                Some(len) => self.on_bulk_out(usb, &packet[..len]),
                None => break,
            }
        }

        self.backend.poll(&mut self.buffers);

        if usb.in_ready() {
            self.send_report(usb);
        }

        let enabled = usb.out_enabled();
        let next = self
            .buffers
            .flow
            .out_gate(enabled, self.buffers.outbound.free());
        if next != enabled {
            usb.set_out_enabled(next);
        }
        self.buffers.flow.update_rts(self.buffers.inbound.free());

        self.apply_pins(lines);
    }

    /// USB bus reset: default line coding, empty buffers, OUT gate open
    pub fn on_bus_reset<U: UsbTransport>(&mut self, usb: &mut U) {
        let coding = LineCoding::new(self.profile.default_baud);
        self.settings = self.backend.configure(&coding);
        self.line_coding = coding.to_bytes();
        self.buffers.reset();
        self.send_empty = false;
        self.applied_rts = None;
        self.applied_dtr = None;
        usb.set_out_enabled(true);
        debug!("bridge reset to {} baud", coding.baud);
    }

    /// What the backend actually programmed for the current line coding
    pub fn link_settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn stats(&self) -> LineStats {
        self.backend.stats()
    }

    pub fn buffers(&self) -> &SerialBuffers<IN, OUT> {
        &self.buffers
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send up to `bulk_in` pending bytes, or the zero-length report that
    /// ends a transfer made of full reports
    fn send_report<U: UsbTransport>(&mut self, usb: &mut U) {
        let pending = self.buffers.inbound.used();
        if pending == 0 && !self.send_empty {
            return;
        }

        let len = pending.min(self.profile.bulk_in);
        let mut report = [0u8; MAX_PACKET_SIZE];
        let (head, tail) = self.buffers.inbound.as_slices();
        let first = head.len().min(len);
        report[..first].copy_from_slice(&head[..first]);
        // Wrapped part of the ring
        report[first..len].copy_from_slice(&tail[..len - first]);

        usb.send_in(&report[..len]);
        self.buffers.inbound.consume(len);
        self.send_empty = len == self.profile.bulk_in && self.buffers.inbound.is_empty();
    }

    fn apply_pins<L: ControlLines>(&mut self, lines: &mut L) {
        let flow = self.buffers.flow;
        if self.applied_rts != Some(flow.rts) {
            lines.set_rts(flow.rts);
            self.applied_rts = Some(flow.rts);
        }
        if self.applied_dtr != Some(flow.dtr) {
            lines.set_dtr(flow.dtr);
            self.applied_dtr = Some(flow.dtr);
        }
    }
}
