//! Embassy tasks
//!
//! The USB device task and the bridge poll loop, connected through
//! [`crate::usb::UsbPipes`].

pub mod bridge;
#[cfg(feature = "embedded")]
pub mod usb;

#[cfg(feature = "embedded")]
pub use bridge::bridge_task;
pub use bridge::{service_control, BusResetHook};
#[cfg(feature = "embedded")]
pub use usb::usb_task;
