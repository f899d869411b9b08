//! Baud rate to divisor conversion
//!
//! Both backends clock their bit timing from a prescaled CPU clock and
//! count `divisor + 1` ticks per bit. The divisor is found with a
//! successive-approximation search so the conversion needs no hardware
//! divide.

/// Rate error above which a configured baud rate is logged as inaccurate
pub const MAX_ERROR_PER_MILLE: u32 = 20;

/// Divisor for `baud` given the prescaled `clock`: `round(clock / baud) - 1`,
/// clamped to `0..=max`.
///
/// Non-increasing in `baud`. A zero rate yields `max`.
pub fn quantize(clock: u32, baud: u32, max: u16) -> u16 {
    if baud == 0 {
        return max;
    }
    let clock = clock as u64;
    let baud = baud as u64;

    // Largest n with n * baud <= clock, one bit at a time from the top
    let mut ticks: u64 = 0;
    for shift in (0..32).rev() {
        let candidate = ticks | (1 << shift);
        if candidate * baud <= clock {
            ticks = candidate;
        }
    }

    // Round to nearest
    if (clock - ticks * baud) * 2 >= baud {
        ticks += 1;
    }

    ticks.saturating_sub(1).min(max as u64) as u16
}

/// Rate actually produced by `divisor`
pub fn actual_baud(clock: u32, divisor: u16) -> u32 {
    clock / (divisor as u32 + 1)
}

/// Deviation of the produced rate from the requested one, in parts per thousand
pub fn error_per_mille(clock: u32, baud: u32, divisor: u16) -> u32 {
    if baud == 0 {
        return u32::MAX;
    }
    let actual = actual_baud(clock, divisor) as u64;
    let requested = baud as u64;
    (actual.abs_diff(requested) * 1000 / requested) as u32
}
