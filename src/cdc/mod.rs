//! CDC ACM control plane: line coding and class requests

pub mod line_coding;
pub mod requests;

pub use line_coding::{LineCoding, LineCodingError, Parity, StopBits};
pub use requests::{ClassRequest, SetupPacket};
