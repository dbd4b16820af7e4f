//! Duration to kernel tick conversion.
//!
//! Every timed operation in the crate goes through [`timeout_ticks`], so the
//! rounding and saturation rules below apply uniformly.

use super::{clock, Duration, Instant};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, Ticks, NO_WAIT, WAIT_FOREVER};

const MICROS_PER_SEC: u128 = 1_000_000;

/// Convert `duration` to a tick count at `ticks_per_second`.
///
/// * negative durations fail with `InvalidArgument`;
/// * zero maps to [`NO_WAIT`];
/// * counts that do not fit below [`WAIT_FOREVER`] saturate to it;
/// * otherwise the result is `duration * ticks_per_second`, truncated to
///   whole ticks, computed without intermediate truncation.
pub fn duration_to_ticks(duration: Duration, ticks_per_second: u32) -> Result<Ticks> {
    if duration.is_negative() {
        return Err(Error::invalid_argument(
            "time::duration_to_ticks",
            "negative duration",
        ));
    }
    if duration.is_zero() {
        return Ok(NO_WAIT);
    }

    let ticks = duration.as_micros() as u128 * u128::from(ticks_per_second) / MICROS_PER_SEC;
    Ok(Ticks::try_from(ticks).unwrap_or(WAIT_FOREVER))
}

/// Tick timeout for a wait of `duration` on `kernel`.
///
/// Negative durations are rejected before the kernel is consulted; a zero
/// duration does not touch the kernel either.
pub fn timeout_ticks(kernel: &dyn Kernel, op: &'static str, duration: Duration) -> Result<Ticks> {
    if duration.is_negative() {
        return Err(Error::invalid_argument(op, "negative timeout"));
    }
    if duration.is_zero() {
        return Ok(NO_WAIT);
    }
    duration_to_ticks(duration, clock::tick_frequency(kernel)?)
}

/// Remaining time until `deadline`, clamped at zero.
pub(crate) fn until(kernel: &dyn Kernel, deadline: Instant) -> Result<Duration> {
    let remaining = deadline - clock::SystemClock::now_in(kernel)?;
    Ok(if remaining.is_negative() {
        Duration::ZERO
    } else {
        remaining
    })
}
