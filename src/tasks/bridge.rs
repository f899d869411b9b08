//! Bridge poll loop
//!
//! Drains control events from the USB task, then runs one bridge
//! iteration. On target the loop yields to the executor between
//! iterations so the USB task keeps up.

use log::{debug, info};

use crate::bridge::{Bridge, ControlResponse};
use crate::calibration::{FrameReference, ResetCalibration, TrimStore, TrimmableOscillator};
use crate::serial::SerialBackend;
use crate::usb::{ControlEvent, PacketTransport};

/// Work done on every USB bus reset, before the bridge restarts
pub trait BusResetHook {
    fn on_bus_reset(&mut self);
}

/// Boards clocked from a crystal have nothing to do
impl BusResetHook for () {
    fn on_bus_reset(&mut self) {}
}

/// Crystal-less boards retune the oscillator while the host is still
/// sending bare start-of-frame markers
impl<H, S> BusResetHook for ResetCalibration<H, S>
where
    H: TrimmableOscillator + FrameReference,
    S: TrimStore,
{
    fn on_bus_reset(&mut self) {
        self.run();
    }
}

/// Apply every queued control event to the bridge
pub fn service_control<B, R, const IN: usize, const OUT: usize>(
    bridge: &mut Bridge<B, IN, OUT>,
    transport: &mut PacketTransport<'_>,
    reset_hook: &mut R,
) where
    B: SerialBackend,
    R: BusResetHook,
{
    while let Some(event) = transport.poll_control() {
        match event {
            ControlEvent::Request { setup, data } => {
                if bridge.handle_control(&setup, &data) == ControlResponse::Rejected {
                    debug!("class request 0x{:02x} rejected", setup.request);
                }
            }
            ControlEvent::BusReset => {
                info!("usb bus reset");
                reset_hook.on_bus_reset();
                transport.reset();
                bridge.on_bus_reset(transport);
            }
        }
    }
}

/// Run the bridge forever
#[cfg(feature = "embedded")]
pub async fn bridge_task<B, L, R, const IN: usize, const OUT: usize>(
    mut bridge: Bridge<B, IN, OUT>,
    mut transport: PacketTransport<'static>,
    mut lines: L,
    mut reset_hook: R,
) where
    B: SerialBackend,
    L: crate::serial::ControlLines,
    R: BusResetHook,
{
    loop {
        service_control(&mut bridge, &mut transport, &mut reset_hook);
        bridge.poll(&mut transport, &mut lines);
        embassy_futures::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::board;
    use crate::serial::traits::mock::{MockControlLines, MockUart};
    use crate::serial::HardwareSerial;
    use crate::usb::{Packet, UsbPipes, UsbTransport};
    use futures::executor::block_on;

    #[test]
    fn test_control_events_reach_bridge() {
        let pipes = UsbPipes::new();
        let mut transport = PacketTransport::new(&pipes, board::HARDWARE.bulk_out);
        let mut bridge: crate::bridge::HardwareBridge<MockUart> =
            Bridge::new(HardwareSerial::new(MockUart::new()), &board::HARDWARE);
        let mut lines = MockControlLines::new();

        let coding = [0x00, 0x4B, 0x00, 0x00, 0, 2, 7];
        block_on(pipes.control.send(ControlEvent::set_line_coding(coding)));
        block_on(pipes.control.send(ControlEvent::set_control_line_state(1)));

        service_control(&mut bridge, &mut transport, &mut ());
        bridge.poll(&mut transport, &mut lines);

        assert_eq!(bridge.line_coding(), coding);
        assert_eq!(bridge.link_settings().requested_baud, 19200);
        assert!(lines.dtr);
    }

    #[test]
    fn test_host_packets_flow_through_pipes() {
        let pipes = UsbPipes::new();
        let mut transport = PacketTransport::new(&pipes, board::HARDWARE.bulk_out);
        let mut bridge: crate::bridge::HardwareBridge<MockUart> =
            Bridge::new(HardwareSerial::new(MockUart::new()), &board::HARDWARE);
        let mut lines = MockControlLines::new();

        // A full-speed packet larger than the board's bulk OUT size
        let data: std::vec::Vec<u8> = (0..20).collect();
        block_on(pipes.out_packets.send(Packet::from_slice(&data).unwrap()));
        bridge.backend().uart().queue_rx(b"pong");

        bridge.poll(&mut transport, &mut lines);

        assert_eq!(bridge.backend().uart().tx_data(), data);
        let report = block_on(pipes.in_reports.receive());
        assert_eq!(&report[..], b"pong");
    }

    #[test]
    fn test_bus_reset_clears_pipes() {
        let pipes = UsbPipes::new();
        let mut transport = PacketTransport::new(&pipes, board::HARDWARE.bulk_out);
        let mut bridge: crate::bridge::HardwareBridge<MockUart> =
            Bridge::new(HardwareSerial::new(MockUart::new()), &board::HARDWARE);

        block_on(pipes.out_packets.send(Packet::from_slice(b"stale").unwrap()));
        bridge.set_line_coding(&[0x00, 0xC2, 0x01, 0x00, 0, 0, 8]).unwrap();
        transport.set_out_enabled(false);
        block_on(pipes.control.send(ControlEvent::BusReset));

        service_control(&mut bridge, &mut transport, &mut ());

        assert!(pipes.out_packets.is_empty());
        assert!(transport.out_enabled());
        assert_eq!(bridge.line_coding(), [0x80, 0x25, 0, 0, 0, 0, 8]);
    }

    #[test]
    fn test_bus_reset_runs_calibration_first() {
        use crate::calibration::traits::mock::{MockTrimStore, SimOscillator};
        use crate::calibration::{CalibrationOutcome, Calibrator, SearchPlan};
        use crate::config::clock::F_CPU_HZ;

        let calibrator = Calibrator::new(SearchPlan::linear_low(), F_CPU_HZ);
        let target = calibrator.target() as i32;
        let osc = SimOscillator::new(30, move |trim: u8| {
            (target + (trim as i32 - 90) * 12) as u16
        });
        let mut session = ResetCalibration::new(calibrator, osc, MockTrimStore::new(30));

        let pipes = UsbPipes::new();
        let mut transport = PacketTransport::new(&pipes, board::HARDWARE.bulk_out);
        let mut bridge: crate::bridge::HardwareBridge<MockUart> =
            Bridge::new(HardwareSerial::new(MockUart::new()), &board::HARDWARE);

        service_control(&mut bridge, &mut transport, &mut session);
        assert_eq!(session.last_outcome(), None);

        block_on(pipes.control.send(ControlEvent::BusReset));
        service_control(&mut bridge, &mut transport, &mut session);

        assert!(matches!(
            session.last_outcome(),
            Some(CalibrationOutcome::Calibrated { trim: 90, .. })
        ));
        assert_eq!(session.store().value(), 90);
    }
}
