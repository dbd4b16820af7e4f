//! Time types and kernel clock access.
//!
//! Durations are signed microsecond counts, so that a negative timeout can
//! be expressed and rejected instead of silently wrapping.

pub mod clock;
pub mod ticks;

use core::ops::{Add, Neg, Sub};

pub use clock::{HighResolutionClock, SystemClock};
pub use ticks::{duration_to_ticks, timeout_ticks};

/// Signed span of time with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    micros: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { micros: 0 };
    pub const MAX: Duration = Duration { micros: i64::MAX };
    pub const MIN: Duration = Duration { micros: i64::MIN };

    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            micros: millis.saturating_mul(1_000),
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self {
            micros: secs.saturating_mul(1_000_000),
        }
    }

    pub const fn as_micros(self) -> i64 {
        self.micros
    }

    pub const fn as_millis(self) -> i64 {
        self.micros / 1_000
    }

    pub const fn is_negative(self) -> bool {
        self.micros < 0
    }

    pub const fn is_zero(self) -> bool {
        self.micros == 0
    }

    pub const fn saturating_add(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros.saturating_add(rhs.micros))
    }

    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(rhs.micros))
    }
}

impl From<core::time::Duration> for Duration {
    /// Spans beyond `i64::MAX` microseconds saturate to [`Duration::MAX`].
    fn from(d: core::time::Duration) -> Self {
        Duration::from_micros(i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration::from_micros(self.micros.saturating_neg())
    }
}

/// Point on a kernel clock, in microseconds since that clock's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    micros: i64,
}

impl Instant {
    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub const fn as_micros(self) -> i64 {
        self.micros
    }

    /// Signed time between `earlier` and `self`; negative if `earlier` is
    /// in fact later.
    pub const fn duration_since(self, earlier: Instant) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(earlier.micros))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros.saturating_add(rhs.as_micros()))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros.saturating_sub(rhs.as_micros()))
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.duration_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_scale() {
        assert_eq!(Duration::from_millis(100).as_micros(), 100_000);
        assert_eq!(Duration::from_secs(2).as_micros(), 2_000_000);
        assert_eq!(Duration::from_secs(i64::MAX), Duration::MAX);
    }

    #[test]
    fn std_duration_saturates() {
        let huge = core::time::Duration::from_secs(u64::MAX);
        assert_eq!(Duration::from(huge), Duration::MAX);
        let small = core::time::Duration::from_micros(1500);
        assert_eq!(Duration::from(small).as_micros(), 1500);
    }

    #[test]
    fn instant_difference_is_signed() {
        let a = Instant::from_micros(1_000);
        let b = Instant::from_micros(4_000);
        assert_eq!((b - a).as_micros(), 3_000);
        assert!((a - b).is_negative());
        assert_eq!(a + Duration::from_millis(3), b);
    }
}
