//! ESP32-S3 adapters for the bridge's hardware traits

pub mod soft_serial;
pub mod uart;

pub use soft_serial::{rx_edge_isr, EspSoftSerialHw, SOFT_LINK};
pub use uart::EspUart;
