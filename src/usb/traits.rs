//! USB transport seen from the bridge
//!
//! The USB protocol engine (enumeration, descriptors, endpoint
//! arbitration) lives elsewhere. The bridge only needs to hand IN reports
//! to the bulk IN endpoint, pull host data from bulk OUT, and tell the
//! engine when to stop accepting OUT packets.

/// Packet-level access to the CDC data endpoints
pub trait UsbTransport {
    /// The IN endpoint can take another report
    fn in_ready(&self) -> bool;

    /// Queue one IN report. A zero-length slice ends the current transfer.
    fn send_in(&mut self, data: &[u8]);

    /// Copy the next OUT packet into `buf` and return its length
    fn receive_out(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Accept (true) or NAK (false) further OUT packets
    fn set_out_enabled(&mut self, enabled: bool);

    fn out_enabled(&self) -> bool;
}
