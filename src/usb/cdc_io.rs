//! Packet pipes between the USB device task and the bridge poll loop
//!
//! The USB task owns the CDC ACM endpoints and runs async; the bridge is a
//! synchronous poll loop. They meet in [`UsbPipes`]: bounded channels of
//! whole packets plus a channel of control events. [`PacketTransport`] is
//! the bridge-side [`UsbTransport`] over those channels.
//!
//! Class requests are answered in the USB task by [`ControlForwarder`]. It
//! validates line coding the same way the bridge does, so a rejected
//! coding stalls the request and GET_LINE_CODING returns the last accepted
//! bytes.
//!
//! The OUT gate needs no signal back to the USB task: while it is closed
//! the bridge stops pulling packets, the channel fills, and the task stops
//! reading the endpoint, which NAKs the host.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use log::warn;

use super::traits::UsbTransport;
use crate::bridge::ControlResponse;
use crate::cdc::requests::{SetupPacket, SET_CONTROL_LINE_STATE, SET_LINE_CODING};
use crate::cdc::{ClassRequest, LineCoding};
use crate::config::usb::{LINE_CODING_LEN, MAX_PACKET_SIZE, PACKET_QUEUE_DEPTH};

/// One bulk packet
pub type Packet = Vec<u8, MAX_PACKET_SIZE>;

/// Control-plane events forwarded from the USB task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A class request with its OUT data stage
    Request {
        setup: SetupPacket,
        data: Vec<u8, LINE_CODING_LEN>,
    },
    /// The host reset the bus
    BusReset,
}

impl ControlEvent {
    /// SET_LINE_CODING carrying `coding`
    pub fn set_line_coding(coding: [u8; LINE_CODING_LEN]) -> Self {
        ControlEvent::Request {
            setup: SetupPacket::class_out(SET_LINE_CODING, 0, LINE_CODING_LEN as u16),
            data: Vec::from_slice(&coding).unwrap_or_default(),
        }
    }

    /// SET_CONTROL_LINE_STATE with the given `wValue`
    pub fn set_control_line_state(value: u16) -> Self {
        ControlEvent::Request {
            setup: SetupPacket::class_out(SET_CONTROL_LINE_STATE, value, 0),
            data: Vec::new(),
        }
    }
}

/// Channels shared by the USB task and the bridge
pub struct UsbPipes {
    /// Host -> device packets
    pub out_packets: Channel<CriticalSectionRawMutex, Packet, PACKET_QUEUE_DEPTH>,
    /// Device -> host reports
    pub in_reports: Channel<CriticalSectionRawMutex, Packet, PACKET_QUEUE_DEPTH>,
    pub control: Channel<CriticalSectionRawMutex, ControlEvent, PACKET_QUEUE_DEPTH>,
}

impl UsbPipes {
    pub const fn new() -> Self {
        Self {
            out_packets: Channel::new(),
            in_reports: Channel::new(),
            control: Channel::new(),
        }
    }
}

impl Default for UsbPipes {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipes used by the firmware binary
pub static USB_PIPES: UsbPipes = UsbPipes::new();

/// Bridge-side view of [`UsbPipes`]
pub struct PacketTransport<'a> {
    pipes: &'a UsbPipes,
    out_enabled: bool,
    /// Largest chunk handed to the bridge per `receive_out`
    chunk: usize,
    /// Remainder of a host packet larger than `chunk`
    partial: Packet,
    offset: usize,
}

impl<'a> PacketTransport<'a> {
    /// Transport that splits host packets into pieces of at most `chunk`
    /// bytes, the board's bulk OUT size
    pub fn new(pipes: &'a UsbPipes, chunk: usize) -> Self {
        Self {
            pipes,
            out_enabled: true,
            chunk: chunk.clamp(1, MAX_PACKET_SIZE),
            partial: Vec::new(),
            offset: 0,
        }
    }

    /// Next control event, if any
    pub fn poll_control(&self) -> Option<ControlEvent> {
        self.pipes.control.try_receive().ok()
    }

    /// Forget a half-consumed host packet (bus reset)
    pub fn reset(&mut self) {
        self.partial.clear();
        self.offset = 0;
        self.pipes.out_packets.clear();
        self.pipes.in_reports.clear();
    }
}

impl UsbTransport for PacketTransport<'_> {
    fn in_ready(&self) -> bool {
        !self.pipes.in_reports.is_full()
    }

    fn send_in(&mut self, data: &[u8]) {
        if let Ok(report) = Vec::from_slice(data) {
            let _ = self.pipes.in_reports.try_send(report);
        }
    }

    fn receive_out(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.offset >= self.partial.len() {
            self.partial = self.pipes.out_packets.try_receive().ok()?;
            self.offset = 0;
        }
        let len = (self.partial.len() - self.offset).min(self.chunk).min(buf.len());
        buf[..len].copy_from_slice(&self.partial[self.offset..self.offset + len]);
        self.offset += len;
        Some(len)
    }

    fn set_out_enabled(&mut self, enabled: bool) {
        self.out_enabled = enabled;
    }

    fn out_enabled(&self) -> bool {
        self.out_enabled
    }
}

/// USB-task side of the control pipe.
///
/// Validates class requests, forwards accepted ones to the bridge and
/// answers GET_LINE_CODING from its own copy of the last accepted coding.
pub struct ControlForwarder<'a> {
    pipes: &'a UsbPipes,
    default_coding: [u8; LINE_CODING_LEN],
    line_coding: [u8; LINE_CODING_LEN],
}

impl<'a> ControlForwarder<'a> {
    /// Forwarder whose coding starts, and resets to, 8N1 at `default_baud`
    pub fn new(pipes: &'a UsbPipes, default_baud: u32) -> Self {
        let coding = LineCoding::new(default_baud).to_bytes();
        Self {
            pipes,
            default_coding: coding,
            line_coding: coding,
        }
    }

    /// Host-to-device class request with its data stage
    pub fn control_out(&mut self, setup: &SetupPacket, data: &[u8]) -> ControlResponse {
        match ClassRequest::parse(setup) {
            ClassRequest::SetLineCoding => {
                if let Err(e) = LineCoding::parse(data) {
                    warn!("line coding rejected: {:?}", e);
                    return ControlResponse::Rejected;
                }
                let Ok(payload) = Vec::from_slice(data) else {
                    return ControlResponse::Rejected;
                };
                let response = self.forward(ControlEvent::Request {
                    setup: *setup,
                    data: payload,
                });
                if response == ControlResponse::Accepted {
                    self.line_coding.copy_from_slice(data);
                }
                response
            }
            ClassRequest::SetControlLineState(value) => {
                self.forward(ControlEvent::set_control_line_state(value))
            }
            ClassRequest::GetLineCoding | ClassRequest::Unsupported(_) => {
                ControlResponse::Rejected
            }
        }
    }

    /// Device-to-host class request
    pub fn control_in(&mut self, setup: &SetupPacket) -> ControlResponse {
        match ClassRequest::parse(setup) {
            ClassRequest::GetLineCoding => ControlResponse::Data(self.line_coding),
            _ => ControlResponse::Rejected,
        }
    }

    /// The host reset the bus: back to the default coding, and tell the
    /// bridge to do the same
    pub fn bus_reset(&mut self) {
        self.line_coding = self.default_coding;
        if self.pipes.control.try_send(ControlEvent::BusReset).is_err() {
            warn!("control queue full, bus reset not forwarded");
        }
    }

    /// Last accepted line coding
    pub fn line_coding(&self) -> [u8; LINE_CODING_LEN] {
        self.line_coding
    }

    /// A request the bridge will never see is stalled, not acknowledged
    fn forward(&self, event: ControlEvent) -> ControlResponse {
        match self.pipes.control.try_send(event) {
            Ok(()) => ControlResponse::Accepted,
            Err(_) => {
                warn!("control queue full, request stalled");
                ControlResponse::Rejected
            }
        }
    }
}

#[cfg(feature = "embedded")]
pub use pump::{in_pump, out_pump, CdcControlHandler};

#[cfg(feature = "embedded")]
mod pump {
    //! Async halves running in the USB task

    use embassy_usb::class::cdc_acm::{Receiver, Sender};
    use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
    use embassy_usb::driver::{Direction, Driver};
    use embassy_usb::Handler;
    use log::debug;

    use super::{ControlForwarder, Packet, UsbPipes};
    use crate::bridge::ControlResponse;
    use crate::cdc::requests::SetupPacket;
    use crate::config::usb::MAX_PACKET_SIZE;

    /// Read host packets into the OUT pipe. Blocks on the pipe when the
    /// bridge has closed its gate.
    pub async fn out_pump<'d, D: Driver<'d>>(mut receiver: Receiver<'d, D>, pipes: &UsbPipes) {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            receiver.wait_connection().await;
            match receiver.read_packet(&mut buf).await {
                Ok(len) => {
                    if let Ok(packet) = Packet::from_slice(&buf[..len]) {
                        pipes.out_packets.send(packet).await;
                    }
                }
                Err(e) => debug!("bulk OUT: {:?}", e),
            }
        }
    }

    /// Write bridge reports to the IN endpoint
    pub async fn in_pump<'d, D: Driver<'d>>(mut sender: Sender<'d, D>, pipes: &UsbPipes) {
        loop {
            let report = pipes.in_reports.receive().await;
            if let Err(e) = sender.write_packet(&report).await {
                debug!("bulk IN: {:?}", e);
            }
        }
    }

    /// Device-level handler serving the CDC class requests.
    ///
    /// Registered before the CDC ACM class, so it answers the class
    /// requests and the class only carries the data endpoints.
    pub struct CdcControlHandler {
        forwarder: ControlForwarder<'static>,
    }

    impl CdcControlHandler {
        pub fn new(pipes: &'static UsbPipes, default_baud: u32) -> Self {
            Self {
                forwarder: ControlForwarder::new(pipes, default_baud),
            }
        }
    }

    /// Class request addressed to an interface, as a raw setup packet
    fn class_setup(req: &Request) -> Option<SetupPacket> {
        if req.request_type != RequestType::Class || req.recipient != Recipient::Interface {
            return None;
        }
        let direction = match req.direction {
            Direction::In => 0x80,
            Direction::Out => 0x00,
        };
        Some(SetupPacket {
            // Class type, interface recipient
            request_type: direction | 0x21,
            request: req.request,
            value: req.value,
            index: req.index,
            length: req.length,
        })
    }

    impl Handler for CdcControlHandler {
        fn reset(&mut self) {
            self.forwarder.bus_reset();
        }

        fn control_out(&mut self, req: Request, data: &[u8]) -> Option<OutResponse> {
            let setup = class_setup(&req)?;
            match self.forwarder.control_out(&setup, data) {
                ControlResponse::Accepted => Some(OutResponse::Accepted),
                _ => Some(OutResponse::Rejected),
            }
        }

        fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
            let setup = class_setup(&req)?;
            match self.forwarder.control_in(&setup) {
                ControlResponse::Data(coding) if buf.len() >= coding.len() => {
                    buf[..coding.len()].copy_from_slice(&coding);
                    Some(InResponse::Accepted(&buf[..coding.len()]))
                }
                _ => Some(InResponse::Rejected),
            }
        }
    }
}
