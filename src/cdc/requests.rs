//! CDC ACM class request decoding

/// `bmRequestType` type field (bits 5..6)
const REQUEST_TYPE_MASK: u8 = 0x60;
const REQUEST_TYPE_CLASS: u8 = 0x20;

pub const SET_LINE_CODING: u8 = 0x20;
pub const GET_LINE_CODING: u8 = 0x21;
pub const SET_CONTROL_LINE_STATE: u8 = 0x22;
pub const SEND_BREAK: u8 = 0x23;

/// `wValue` bit carrying DTR in SET_CONTROL_LINE_STATE. The host's RTS
/// bit is ignored; our RTS is driven by inbound flow control.
pub const CONTROL_LINE_DTR: u16 = 0x0001;

/// The eight-byte SETUP stage of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn from_bytes(raw: [u8; 8]) -> Self {
        Self {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Host-to-device class request addressed to the communication interface
    pub const fn class_out(request: u8, value: u16, length: u16) -> Self {
        Self {
            request_type: 0x21,
            request,
            value,
            index: 0,
            length,
        }
    }

    /// Device-to-host class request addressed to the communication interface
    pub const fn class_in(request: u8, length: u16) -> Self {
        Self {
            request_type: 0xA1,
            request,
            value: 0,
            index: 0,
            length,
        }
    }
}

/// Class requests the bridge acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRequest {
    /// Seven-byte data stage follows
    SetLineCoding,
    /// Reply with the stored seven bytes
    GetLineCoding,
    /// Raw `wValue`; bit 0 is DTR
    SetControlLineState(u16),
    /// Anything else, including SEND_BREAK and standard/vendor requests
    Unsupported(u8),
}

impl ClassRequest {
    pub fn parse(setup: &SetupPacket) -> Self {
        if setup.request_type & REQUEST_TYPE_MASK != REQUEST_TYPE_CLASS {
            return ClassRequest::Unsupported(setup.request);
        }
        match setup.request {
            SET_LINE_CODING => ClassRequest::SetLineCoding,
            GET_LINE_CODING => ClassRequest::GetLineCoding,
            SET_CONTROL_LINE_STATE => ClassRequest::SetControlLineState(setup.value),
            other => ClassRequest::Unsupported(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_coding_requests() {
        let set = SetupPacket::from_bytes([0x21, 0x20, 0, 0, 0, 0, 7, 0]);
        assert_eq!(set.length, 7);
        assert_eq!(ClassRequest::parse(&set), ClassRequest::SetLineCoding);

        let get = SetupPacket::from_bytes([0xA1, 0x21, 0, 0, 0, 0, 7, 0]);
        assert_eq!(ClassRequest::parse(&get), ClassRequest::GetLineCoding);
    }

    #[test]
    fn test_parse_control_line_state() {
        let setup = SetupPacket::class_out(SET_CONTROL_LINE_STATE, 0x0003, 0);
        assert_eq!(
            ClassRequest::parse(&setup),
            ClassRequest::SetControlLineState(0x0003)
        );
    }

    #[test]
    fn test_send_break_unsupported() {
        let setup = SetupPacket::class_out(SEND_BREAK, 0xFFFF, 0);
        assert_eq!(
            ClassRequest::parse(&setup),
            ClassRequest::Unsupported(SEND_BREAK)
        );
    }

    #[test]
    fn test_standard_request_unsupported() {
        // Standard request whose number collides with GET_LINE_CODING
        let setup = SetupPacket::from_bytes([0x80, 0x21, 0, 1, 0, 0, 18, 0]);
        assert_eq!(ClassRequest::parse(&setup), ClassRequest::Unsupported(0x21));
    }
}
