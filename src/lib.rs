#![cfg_attr(not(test), no_std)]

pub mod bridge;
pub mod buffer;
pub mod calibration;
pub mod cdc;
pub mod config;
pub mod serial;
pub mod tasks;
pub mod usb;

// ESP32-S3 drivers, only available with the embedded feature
#[cfg(feature = "embedded")]
pub mod board;
