//! Kernel-backed counting and binary semaphores.

use crate::error::{fatal, kernel_error, wait_status, Error, Result, WaitStatus};
use crate::kernel::{Kernel, SemaphoreId, Ticks, NO_WAIT, WAIT_FOREVER};
use crate::time::{ticks, Duration, Instant};

/// Counting semaphore with a bounded count in `0..=max`.
///
/// Releasing past `max` fails instead of being dropped silently.
pub struct Semaphore {
    kernel: &'static dyn Kernel,
    id: SemaphoreId,
    max: u32,
}

impl Semaphore {
    pub fn new(initial: u32, max: u32) -> Result<Self> {
        Self::new_in(crate::os::kernel()?, initial, max)
    }

    pub fn new_in(kernel: &'static dyn Kernel, initial: u32, max: u32) -> Result<Self> {
        if max == 0 {
            return Err(Error::invalid_argument("Semaphore::new", "zero maximum count"));
        }
        if initial > max {
            return Err(Error::invalid_argument(
                "Semaphore::new",
                "initial count above maximum",
            ));
        }
        let id = kernel
            .semaphore_new(max, initial)
            .ok_or(Error::exhausted("Semaphore::new"))?;
        log::trace!("semaphore {:#x} created ({initial}/{max})", id.get());
        Ok(Self { kernel, id, max })
    }

    pub fn id(&self) -> SemaphoreId {
        self.id
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Current count.
    pub fn available(&self) -> u32 {
        self.kernel.semaphore_count(self.id)
    }

    /// Decrement, blocking while the count is zero.
    pub fn acquire(&self) -> Result<()> {
        let status = self.kernel.semaphore_acquire(self.id, WAIT_FOREVER);
        wait_status("Semaphore::acquire", self.id, status, WAIT_FOREVER).map(|_| ())
    }

    /// Decrement if the count is positive, without blocking.
    pub fn try_acquire(&self) -> Result<bool> {
        Ok(!self.acquire_ticks("Semaphore::try_acquire", NO_WAIT)?.timed_out())
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> Result<WaitStatus> {
        const OP: &str = "Semaphore::try_acquire_for";
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.acquire_ticks(OP, ticks)
    }

    /// A deadline in the past polls once.
    pub fn try_acquire_until(&self, deadline: Instant) -> Result<WaitStatus> {
        const OP: &str = "Semaphore::try_acquire_until";
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.acquire_ticks(OP, ticks)
    }

    pub(crate) fn acquire_ticks(&self, op: &'static str, ticks: Ticks) -> Result<WaitStatus> {
        let status = self.kernel.semaphore_acquire(self.id, ticks);
        wait_status(op, self.id, status, ticks)
    }

    /// Increment the count by `n`, one kernel call per unit.
    ///
    /// Stops at the first failing unit; units released before it stay
    /// released.
    pub fn release(&self, n: u32) -> Result<()> {
        for _ in 0..n {
            let status = self.kernel.semaphore_release(self.id);
            if !status.is_ok() {
                return Err(kernel_error("Semaphore::release", self.id, status));
            }
        }
        Ok(())
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let status = self.kernel.semaphore_delete(self.id);
        if !status.is_ok() {
            fatal(Error::from_status("Semaphore::drop", self.id, status));
        }
        log::trace!("semaphore {:#x} deleted", self.id.get());
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("id", &self.id)
            .field("max", &self.max)
            .finish()
    }
}

/// Semaphore with a maximum count of one.
#[derive(Debug)]
pub struct BinarySemaphore(Semaphore);

impl BinarySemaphore {
    pub fn new(available: bool) -> Result<Self> {
        Self::new_in(crate::os::kernel()?, available)
    }

    pub fn new_in(kernel: &'static dyn Kernel, available: bool) -> Result<Self> {
        Semaphore::new_in(kernel, u32::from(available), 1).map(Self)
    }

    pub fn id(&self) -> SemaphoreId {
        self.0.id()
    }

    pub fn acquire(&self) -> Result<()> {
        self.0.acquire()
    }

    pub fn try_acquire(&self) -> Result<bool> {
        self.0.try_acquire()
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> Result<WaitStatus> {
        self.0.try_acquire_for(timeout)
    }

    pub fn try_acquire_until(&self, deadline: Instant) -> Result<WaitStatus> {
        self.0.try_acquire_until(deadline)
    }

    pub(crate) fn acquire_ticks(&self, op: &'static str, ticks: Ticks) -> Result<WaitStatus> {
        self.0.acquire_ticks(op, ticks)
    }

    /// Fails if the semaphore is already signaled.
    pub fn release(&self) -> Result<()> {
        self.0.release(1)
    }
}
