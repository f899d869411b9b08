//! USB CDC ACM side of the bridge
//!
//! `traits` is the seam the bridge is written against; `cdc_io` connects
//! it to the embassy-usb CDC ACM class running in its own task.

pub mod cdc_io;
pub mod traits;

pub use cdc_io::{ControlEvent, ControlForwarder, Packet, PacketTransport, UsbPipes, USB_PIPES};
pub use traits::UsbTransport;
