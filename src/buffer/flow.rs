//! Flow-control state and thresholds
//!
//! Backpressure is applied before a buffer overflows, never in reaction to
//! it. The outbound buffer gates the USB OUT endpoint; the inbound buffer
//! drives RTS toward the serial peer.

use crate::config::board::BoardProfile;

/// Hysteresis thresholds, in bytes of free space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowThresholds {
    /// Bulk OUT packet size; the OUT gate closes below this
    pub out_packet: usize,
    /// Extra space above `out_packet` required to reopen the gate
    pub out_headroom: usize,
    /// RTS deasserts when inbound free space drops below this
    pub rts_stop_free: usize,
    /// RTS reasserts once inbound free space reaches this
    pub rts_resume_free: usize,
}

impl FlowThresholds {
    pub const fn from_profile(profile: &BoardProfile) -> Self {
        Self {
            out_packet: profile.bulk_out,
            out_headroom: profile.out_headroom,
            rts_stop_free: profile.rts_stop_free,
            rts_resume_free: profile.rts_resume_free,
        }
    }

    /// Free space above which a closed OUT gate reopens
    pub const fn out_reenable_above(&self) -> usize {
        self.out_packet + self.out_headroom
    }
}

/// State of the three modem-control signals
///
/// `rts` and `dtr` are driven by us, `cts` is sampled from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    /// Ready-to-receive toward the serial peer
    pub rts: bool,
    /// Peer's clear-to-send; transmission pauses while deasserted
    pub cts: bool,
    /// Data terminal ready, mirrored from the host
    pub dtr: bool,
    thresholds: FlowThresholds,
}

impl FlowControl {
    /// All signals asserted except DTR, which waits for the host
    pub const fn new(thresholds: FlowThresholds) -> Self {
        Self {
            rts: true,
            cts: true,
            dtr: false,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &FlowThresholds {
        &self.thresholds
    }

    /// Next state of the USB OUT accept gate.
    ///
    /// Closes as soon as another full packet could not be stored and stays
    /// closed until the free space exceeds the re-enable threshold.
    pub fn out_gate(&self, enabled: bool, outbound_free: usize) -> bool {
        if enabled {
            outbound_free >= self.thresholds.out_packet
        } else {
            outbound_free > self.thresholds.out_reenable_above()
        }
    }

    /// Recompute RTS from the inbound free space.
    ///
    /// Returns true if the signal changed.
    pub fn update_rts(&mut self, inbound_free: usize) -> bool {
        let next = if self.rts {
            inbound_free >= self.thresholds.rts_stop_free
        } else {
            inbound_free >= self.thresholds.rts_resume_free
        };
        let changed = next != self.rts;
        self.rts = next;
        changed
    }

    /// Back to power-on state
    pub fn reset(&mut self) {
        self.rts = true;
        self.cts = true;
        self.dtr = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::board;

    fn hardware_flow() -> FlowControl {
        FlowControl::new(FlowThresholds::from_profile(&board::HARDWARE))
    }

    #[test]
    fn test_out_gate_closes_below_one_packet() {
        let flow = hardware_flow();
        assert!(flow.out_gate(true, 8));
        assert!(!flow.out_gate(true, 7));
    }

    #[test]
    fn test_out_gate_hysteresis() {
        let flow = FlowControl::new(FlowThresholds {
            out_packet: 8,
            out_headroom: 4,
            rts_stop_free: 1,
            rts_resume_free: 2,
        });

        // Closed gate stays closed until free space exceeds 12
        assert!(!flow.out_gate(false, 8));
        assert!(!flow.out_gate(false, 12));
        assert!(flow.out_gate(false, 13));
    }

    #[test]
    fn test_rts_watermarks() {
        let mut flow = hardware_flow();
        assert!(flow.rts);

        assert!(!flow.update_rts(8));
        assert!(flow.rts);

        assert!(flow.update_rts(7));
        assert!(!flow.rts);

        // Still below the resume mark
        assert!(!flow.update_rts(15));
        assert!(!flow.rts);

        assert!(flow.update_rts(16));
        assert!(flow.rts);
    }

    #[test]
    fn test_reset() {
        let mut flow = hardware_flow();
        flow.rts = false;
        flow.cts = false;
        flow.dtr = true;
        flow.reset();
        assert_eq!((flow.rts, flow.cts, flow.dtr), (true, true, false));
    }
}
