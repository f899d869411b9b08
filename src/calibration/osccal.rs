//! RC oscillator calibration against USB frame timing
//!
//! Right after a USB bus reset the host sends a start-of-frame marker every
//! millisecond. Timing one frame gives a measurement proportional to the
//! real oscillator frequency, which a binary search over the trim register
//! drives toward the nominal value. A short neighbourhood scan then picks
//! the best of the five values around the coarse result.
//!
//! A single corrupted measurement (another low-speed device on the same
//! host controller can inject broadcast traffic) can send the search far
//! off. If the coarse result is worse than where we started, the original
//! trim is kept.

use log::{debug, info, warn};

use super::traits::{FrameReference, TrimStore, TrimmableOscillator};
use crate::config::calibration::{
    DEFAULT_TRIM_OFFSET, FRAME_REFERENCE_CLOCK_HZ, FRAME_UNITS_PER_10M5, HIGH_RANGE_DEFAULT_TRIM,
    SPLIT_RANGE_TRIAL, TRIM_UNCALIBRATED,
};

/// Trim applied at boot when nothing was persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimDefault {
    /// Absolute trim value
    Fixed(u8),
    /// Offset added to the factory trim
    Offset(u8),
}

/// Shape of the trim register's search space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPlan {
    /// Lowest trim of the searched range
    start: u8,
    /// First step; the range spans `2 * step` values
    step: u8,
    /// Oscillators with two overlapping 128-step halves try this value
    /// first to decide which half holds the target
    split_trial: Option<u8>,
    default: TrimDefault,
}

impl SearchPlan {
    /// Single monotonic range 0..=127
    pub const fn linear_low() -> Self {
        Self {
            start: 0,
            step: 64,
            split_trial: None,
            default: TrimDefault::Offset(DEFAULT_TRIM_OFFSET),
        }
    }

    /// Two halves 0..=127 and 128..=255 (16.5 MHz parts)
    pub const fn split_range() -> Self {
        Self {
            start: 0,
            step: 64,
            split_trial: Some(SPLIT_RANGE_TRIAL),
            default: TrimDefault::Offset(DEFAULT_TRIM_OFFSET),
        }
    }

    /// Upper quarter 192..=255 (12.8 MHz parts)
    pub const fn high_range() -> Self {
        Self {
            start: 192,
            step: 32,
            split_trial: None,
            default: TrimDefault::Fixed(HIGH_RANGE_DEFAULT_TRIM),
        }
    }

    pub const fn default_trim(&self) -> TrimDefault {
        self.default
    }

    /// Number of trials the binary search takes (`log2` of the range)
    pub const fn binary_trials(&self) -> u32 {
        self.step.trailing_zeros() + 1
    }

    /// Inclusive range searched from `base`
    fn range_from(&self, base: u8) -> (u8, u8) {
        let span = (self.step as u16) * 2 - 1;
        let hi = (base as u16 + span).min(u8::MAX as u16) as u8;
        (base, hi)
    }
}

/// Result of one calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// A new trim value is active
    Calibrated {
        trim: u8,
        /// Absolute distance from the target interval
        deviation: u16,
        /// The value differed from storage and was written back
        persisted: bool,
    },
    /// The search looked worse than the starting point and was undone
    Reverted { trim: u8 },
}

/// Outcome of the coarse binary search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoarseResult {
    /// Largest trim whose frame measured below target
    pub trim: u8,
    /// Deviation of the last trial
    pub last_deviation: u16,
}

/// Frame-timing oscillator calibrator
pub struct Calibrator {
    plan: SearchPlan,
    target: u16,
}

impl Calibrator {
    /// Calibrator for a CPU running nominally at `f_cpu_hz`
    pub fn new(plan: SearchPlan, f_cpu_hz: u32) -> Self {
        Self {
            plan,
            target: target_interval(f_cpu_hz),
        }
    }

    /// Measurement expected from a perfectly trimmed oscillator
    pub fn target(&self) -> u16 {
        self.target
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Apply the persisted trim at boot, or the compiled default.
    ///
    /// Returns the trim now in effect.
    pub fn restore<O, S>(&self, osc: &mut O, store: &mut S) -> u8
    where
        O: TrimmableOscillator,
        S: TrimStore,
    {
        let trim = initial_trim(store.load(), osc.trim(), self.plan.default);
        osc.set_trim(trim);
        debug!("oscillator trim restored to {}", trim);
        trim
    }

    /// Run one calibration pass. Call once after each observed bus reset.
    ///
    /// Never fails: a rejected search leaves the previous trim in place and
    /// a failed storage write only costs a recalibration on next boot.
    pub fn calibrate<H, S>(&self, hw: &mut H, store: &mut S) -> CalibrationOutcome
    where
        H: TrimmableOscillator + FrameReference,
        S: TrimStore,
    {
        let original = hw.trim();
        let baseline = self.deviation(hw.measure_reference_interval());

        let coarse = self.coarse_search(hw);
        if coarse.last_deviation > baseline {
            hw.set_trim(original);
            warn!(
                "calibration rejected: deviation {} worse than baseline {}, keeping trim {}",
                coarse.last_deviation, baseline, original
            );
            return CalibrationOutcome::Reverted { trim: original };
        }

        let (trim, deviation) = self.neighbourhood_search(hw, coarse);
        hw.set_trim(trim);

        let persisted = if store.load() != trim {
            match store.store(trim) {
                Ok(()) => true,
                Err(e) => {
                    warn!("failed to persist trim {}: {:?}", trim, e);
                    false
                }
            }
        } else {
            false
        };

        info!(
            "oscillator calibrated: trim {} -> {} (deviation {})",
            original, trim, deviation
        );
        CalibrationOutcome::Calibrated {
            trim,
            deviation,
            persisted,
        }
    }

    /// Binary search over the plan's range.
    ///
    /// Precision is +/-2 trim units around the true optimum for any
    /// monotonic oscillator.
    pub fn coarse_search<H>(&self, hw: &mut H) -> CoarseResult
    where
        H: TrimmableOscillator + FrameReference,
    {
        let mut trial = self.choose_half(hw);
        let mut step = self.plan.step;
        let mut measured;

        loop {
            hw.set_trim(trial + step);
            // Proportional to the current real frequency
            measured = hw.measure_reference_interval();
            if measured < self.target {
                trial += step;
            }
            step >>= 1;
            if step == 0 {
                break;
            }
        }

        CoarseResult {
            trim: trial,
            last_deviation: self.deviation(measured),
        }
    }

    /// Start of the half to search; tries the split point when needed
    fn choose_half<H>(&self, hw: &mut H) -> u8
    where
        H: TrimmableOscillator + FrameReference,
    {
        match self.plan.split_trial {
            Some(trial) => {
                hw.set_trim(trial);
                if hw.measure_reference_interval() < self.target {
                    128
                } else {
                    self.plan.start
                }
            }
            None => self.plan.start,
        }
    }

    /// Best of the five trims centred on the coarse result
    fn neighbourhood_search<H>(&self, hw: &mut H, coarse: CoarseResult) -> (u8, u16)
    where
        H: TrimmableOscillator + FrameReference,
    {
        let base = if coarse.trim >= 128 && self.plan.split_trial.is_some() {
            128
        } else {
            self.plan.start
        };
        let (lo, hi) = self.plan.range_from(base);
        let first = coarse.trim.saturating_sub(2).max(lo);
        let last = coarse.trim.saturating_add(2).min(hi);

        // The coarse trim is one of the candidates; its deviation was never
        // measured directly
        let mut best = (coarse.trim, u16::MAX);
        for candidate in first..=last {
            hw.set_trim(candidate);
            let deviation = self.deviation(hw.measure_reference_interval());
            if deviation < best.1 {
                best = (candidate, deviation);
            }
        }
        best
    }

    fn deviation(&self, measured: u16) -> u16 {
        measured.abs_diff(self.target)
    }
}

/// A calibrator together with the oscillator and storage it tunes
pub struct ResetCalibration<H, S> {
    calibrator: Calibrator,
    hw: H,
    store: S,
    last: Option<CalibrationOutcome>,
}

impl<H, S> ResetCalibration<H, S>
where
    H: TrimmableOscillator + FrameReference,
    S: TrimStore,
{
    /// Applies the persisted (or default) trim straight away
    pub fn new(calibrator: Calibrator, mut hw: H, mut store: S) -> Self {
        calibrator.restore(&mut hw, &mut store);
        Self {
            calibrator,
            hw,
            store,
            last: None,
        }
    }

    /// One calibration pass; the host has just reset the bus
    pub fn run(&mut self) -> CalibrationOutcome {
        let outcome = self.calibrator.calibrate(&mut self.hw, &mut self.store);
        self.last = Some(outcome);
        outcome
    }

    /// Outcome of the most recent pass
    pub fn last_outcome(&self) -> Option<CalibrationOutcome> {
        self.last
    }

    pub fn oscillator(&self) -> &H {
        &self.hw
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Expected frame measurement at `f_cpu_hz`, rounded to nearest
pub const fn target_interval(f_cpu_hz: u32) -> u16 {
    let scaled = FRAME_UNITS_PER_10M5 as u64 * f_cpu_hz as u64;
    let reference = FRAME_REFERENCE_CLOCK_HZ as u64;
    ((scaled + reference / 2) / reference) as u16
}

/// Trim to apply at boot given the stored byte and the factory value
pub const fn initial_trim(stored: u8, factory: u8, default: TrimDefault) -> u8 {
    if stored != TRIM_UNCALIBRATED {
        return stored;
    }
    match default {
        TrimDefault::Fixed(value) => value,
        TrimDefault::Offset(offset) => factory.wrapping_add(offset),
    }
}
