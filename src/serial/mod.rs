//! Serial line backends
//!
//! Two interchangeable implementations of [`SerialBackend`]: one on the
//! on-chip UART, one synthesized from a timer and two GPIOs. The firmware
//! picks one at build time.

pub mod baud;
pub mod hardware;
pub mod software;
pub mod traits;

pub use hardware::{HardwareSerial, TxDrainClock};
pub use software::{SoftSerial, SoftSerialHw, SoftSerialLink, SoftTiming};
pub use traits::{
    ControlLines, FrameFormat, FrameParity, GpioControlLines, LineError, LineStats, LinkSettings,
    SerialBackend, UartPeripheral,
};
