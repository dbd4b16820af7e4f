//! Helpers shared by the integration tests.

#![allow(dead_code)]

extern crate std;

use std::time::{Duration as StdDuration, Instant as StdInstant};

use rtos_sync::host::{HostConfig, HostKernel};

/// A fresh kernel per test, so call counts and object limits are isolated.
pub fn kernel() -> &'static HostKernel {
    HostKernel::new().leak()
}

pub fn kernel_with(config: HostConfig) -> &'static HostKernel {
    HostKernel::with_config(config).leak()
}

/// Poll `condition` until it holds; fail the test after five seconds.
pub fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let start = StdInstant::now();
    while !condition() {
        assert!(
            start.elapsed() < StdDuration::from_secs(5),
            "timed out waiting for {what}"
        );
        std::thread::sleep(StdDuration::from_millis(1));
    }
}

/// Small deterministic generator for scheduling jitter.
pub struct Jitter(u64);

impl Jitter {
    pub fn new(seed: u64) -> Self {
        Jitter(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    pub fn next_micros(&mut self, max: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % max.max(1)
    }
}
