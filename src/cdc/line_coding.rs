//! CDC line coding structure
//!
//! Seven bytes on the wire: `dwDTERate` (u32 little-endian), `bCharFormat`,
//! `bParityType`, `bDataBits`. The raw bytes from the last accepted
//! SET_LINE_CODING are kept so GET_LINE_CODING can echo them verbatim,
//! even when the backend had to round the rate.

use crate::config::usb::LINE_CODING_LEN;

/// Reasons a SET_LINE_CODING payload is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCodingError {
    /// Payload was not exactly seven bytes
    InvalidLength(usize),
    /// Baud rate of zero
    ZeroBaud,
    InvalidStopBits(u8),
    InvalidParity(u8),
    InvalidDataBits(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

impl TryFrom<u8> for StopBits {
    type Error = LineCodingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StopBits::One),
            1 => Ok(StopBits::OnePointFive),
            2 => Ok(StopBits::Two),
            other => Err(LineCodingError::InvalidStopBits(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl TryFrom<u8> for Parity {
    type Error = LineCodingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            other => Err(LineCodingError::InvalidParity(other)),
        }
    }
}

/// Decoded serial line configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCoding {
    pub baud: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// 5, 6, 7, 8 or 16
    pub data_bits: u8,
}

impl LineCoding {
    /// 8N1 at `baud`
    pub const fn new(baud: u32) -> Self {
        Self {
            baud,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        }
    }

    /// Decode and validate a SET_LINE_CODING payload
    pub fn parse(payload: &[u8]) -> Result<Self, LineCodingError> {
        let raw: &[u8; LINE_CODING_LEN] = payload
            .try_into()
            .map_err(|_| LineCodingError::InvalidLength(payload.len()))?;

        let baud = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if baud == 0 {
            return Err(LineCodingError::ZeroBaud);
        }
        let stop_bits = StopBits::try_from(raw[4])?;
        let parity = Parity::try_from(raw[5])?;
        let data_bits = match raw[6] {
            5..=8 | 16 => raw[6],
            other => return Err(LineCodingError::InvalidDataBits(other)),
        };

        Ok(Self {
            baud,
            stop_bits,
            parity,
            data_bits,
        })
    }

    /// Wire representation
    pub fn to_bytes(&self) -> [u8; LINE_CODING_LEN] {
        let rate = self.baud.to_le_bytes();
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            self.stop_bits as u8,
            self.parity as u8,
            self.data_bits,
        ]
    }
}
