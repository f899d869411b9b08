//! Oscillator calibration for crystal-less boards

pub mod osccal;
pub mod traits;

pub use osccal::{
    initial_trim, target_interval, CalibrationOutcome, Calibrator, ResetCalibration, SearchPlan,
    TrimDefault,
};
pub use traits::{FrameReference, StoreError, TrimStore, TrimmableOscillator};
