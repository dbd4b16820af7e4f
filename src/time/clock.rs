//! Tick clock adapter.

use super::Instant;
use crate::error::{Error, ErrorKind, Result};
use crate::kernel::Kernel;

/// Ticks per second of `kernel`.
///
/// A zero frequency means the kernel clock is not running and is reported
/// as a kernel fault.
pub fn tick_frequency(kernel: &dyn Kernel) -> Result<u32> {
    match kernel.tick_frequency() {
        0 => Err(Error::new(ErrorKind::KernelFault, "clock::tick_frequency")
            .with_reason("kernel tick frequency is zero")),
        freq => Ok(freq),
    }
}

pub fn tick_count(kernel: &dyn Kernel) -> u64 {
    kernel.tick_count()
}

// Multiply first; the u128 intermediate cannot overflow for u64 counts.
fn scale(count: u64, freq: u32, unit_per_sec: u128) -> i64 {
    let scaled = u128::from(count) * unit_per_sec / u128::from(freq);
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

/// Tick-based clock; resolution is one kernel tick.
pub struct SystemClock;

impl SystemClock {
    pub fn now() -> Result<Instant> {
        Self::now_in(crate::os::kernel()?)
    }

    pub fn now_in(kernel: &dyn Kernel) -> Result<Instant> {
        let freq = tick_frequency(kernel)?;
        Ok(Instant::from_micros(scale(kernel.tick_count(), freq, 1_000_000)))
    }
}

/// Clock driven by the kernel system timer, finer grained than the tick.
/// Its instants share the microsecond scale of [`SystemClock`] but not its
/// epoch.
pub struct HighResolutionClock;

impl HighResolutionClock {
    pub fn now() -> Result<Instant> {
        Self::now_in(crate::os::kernel()?)
    }

    pub fn now_in(kernel: &dyn Kernel) -> Result<Instant> {
        let freq = kernel.sys_timer_frequency();
        if freq == 0 {
            return Err(Error::new(ErrorKind::KernelFault, "HighResolutionClock::now")
                .with_reason("system timer frequency is zero"));
        }
        Ok(Instant::from_micros(scale(
            kernel.sys_timer_count(),
            freq,
            1_000_000,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::scale;

    #[test]
    fn scale_multiplies_before_dividing() {
        // 3 ticks at 7 Hz: truncating first would yield 0.
        assert_eq!(scale(3, 7, 1_000_000), 428_571);
        assert_eq!(scale(1_000, 1_000, 1_000_000), 1_000_000);
        assert_eq!(scale(u64::MAX, 1, 1_000_000_000), i64::MAX);
    }
}
