//! Condition variable built from kernel semaphores.
//!
//! The kernel has no call that releases one object and blocks on another
//! atomically. Each waiter therefore blocks on a private binary semaphore
//! that it registers in the condition variable's wait list before letting
//! go of the caller's mutex. A notifier pops entries from the front of the
//! list and signals them, so a notification can never fall between the
//! unlock and the block.
//!
//! On a timed wait that expires, list membership decides the outcome: a
//! waiter still listed removes itself and reports a timeout; a waiter no
//! longer listed was signaled concurrently and reports the notification.

use alloc::collections::VecDeque;
use core::fmt;

use super::mutex::{Mutex, MutexGuard};
use super::semaphore::BinarySemaphore;
use crate::error::{fatal, Error, Result, WaitStatus};
use crate::kernel::{Kernel, SemaphoreId, Ticks, WAIT_FOREVER};
use crate::time::{ticks, Duration, Instant, SystemClock};

/// Condition variable over a [`Mutex`].
///
/// Notifications are not remembered: a notify with no registered waiter is
/// lost. Use the predicate forms to check state under the lock before
/// waiting.
pub struct Condvar {
    kernel: &'static dyn Kernel,
    // Held only for list updates, never across a blocking call.
    waiters: Mutex<VecDeque<SemaphoreId>>,
}

impl Condvar {
    pub fn new() -> Result<Self> {
        Self::new_in(crate::os::kernel()?)
    }

    pub fn new_in(kernel: &'static dyn Kernel) -> Result<Self> {
        Ok(Self {
            kernel,
            waiters: Mutex::new_in(kernel, VecDeque::new())?,
        })
    }

    /// Block until notified.
    ///
    /// The mutex is released while blocked and held again on return. On
    /// error the guard is dropped.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> Result<MutexGuard<'a, T>> {
        let (guard, _) = self.wait_ticks("Condvar::wait", guard, WAIT_FOREVER)?;
        Ok(guard)
    }

    /// Block while `condition` holds, checking it under the lock before
    /// every wait.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> Result<MutexGuard<'a, T>>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard)?;
        }
        Ok(guard)
    }

    /// Block until notified or until `timeout` elapses.
    ///
    /// A negative timeout fails with `InvalidArgument` before anything is
    /// registered; a zero timeout polls.
    pub fn wait_for<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> Result<(MutexGuard<'a, T>, WaitStatus)> {
        const OP: &str = "Condvar::wait_for";
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.wait_ticks(OP, guard, ticks)
    }

    /// Block until notified or until `deadline`.
    ///
    /// A deadline already passed returns [`WaitStatus::Timeout`] at once,
    /// with the mutex still held.
    pub fn wait_until<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: Instant,
    ) -> Result<(MutexGuard<'a, T>, WaitStatus)> {
        const OP: &str = "Condvar::wait_until";
        let remaining = deadline - SystemClock::now_in(self.kernel)?;
        if remaining.is_negative() || remaining.is_zero() {
            return Ok((guard, WaitStatus::Timeout));
        }
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.wait_ticks(OP, guard, ticks)
    }

    /// Block while `condition` holds, for at most `timeout`.
    ///
    /// Returns [`WaitStatus::Timeout`] if time ran out with the condition
    /// still holding.
    pub fn wait_timeout_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        timeout: Duration,
        mut condition: F,
    ) -> Result<(MutexGuard<'a, T>, WaitStatus)>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        const OP: &str = "Condvar::wait_timeout_while";
        if timeout.is_negative() {
            return Err(Error::invalid_argument(OP, "negative timeout"));
        }
        let deadline = SystemClock::now_in(self.kernel)? + timeout;
        let mut remaining = timeout;
        while condition(&mut *guard) {
            let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
            let (next, status) = self.wait_ticks(OP, guard, ticks)?;
            guard = next;
            if status.timed_out() {
                let status = still_waiting(condition(&mut *guard));
                return Ok((guard, status));
            }
            remaining = ticks::until(self.kernel, deadline)?;
        }
        Ok((guard, WaitStatus::NoTimeout))
    }

    /// Block while `condition` holds, at most until `deadline`.
    pub fn wait_until_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        deadline: Instant,
        mut condition: F,
    ) -> Result<(MutexGuard<'a, T>, WaitStatus)>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            let (next, status) = self.wait_until(guard, deadline)?;
            guard = next;
            if status.timed_out() {
                let status = still_waiting(condition(&mut *guard));
                return Ok((guard, status));
            }
        }
        Ok((guard, WaitStatus::NoTimeout))
    }

    /// Wake the longest waiting thread. Returns whether there was one.
    pub fn notify_one(&self) -> bool {
        let mut waiters = self.lock_waiters("Condvar::notify_one");
        match waiters.pop_front() {
            Some(cell) => {
                self.signal("Condvar::notify_one", cell);
                true
            }
            None => false,
        }
    }

    /// Wake every registered thread. Returns how many were woken.
    pub fn notify_all(&self) -> usize {
        let mut waiters = self.lock_waiters("Condvar::notify_all");
        let woken = waiters.len();
        for cell in waiters.drain(..) {
            self.signal("Condvar::notify_all", cell);
        }
        woken
    }

    /// Number of threads currently registered as waiting.
    pub fn waiters(&self) -> Result<usize> {
        Ok(self.waiters.lock()?.len())
    }

    fn wait_ticks<'a, T: ?Sized>(
        &self,
        op: &'static str,
        guard: MutexGuard<'a, T>,
        ticks: Ticks,
    ) -> Result<(MutexGuard<'a, T>, WaitStatus)> {
        let cell = BinarySemaphore::new_in(self.kernel, false)?;

        // Registered while the caller's lock is still held.
        self.waiters.lock()?.push_back(cell.id());

        let mutex = guard.into_mutex();
        if let Err(err) = mutex.raw().unlock() {
            self.unregister(op, cell.id());
            return Err(err);
        }

        let outcome = match cell.acquire_ticks(op, ticks) {
            Ok(WaitStatus::NoTimeout) => Ok(WaitStatus::NoTimeout),
            Ok(WaitStatus::Timeout) => Ok(if self.unregister(op, cell.id()) {
                WaitStatus::Timeout
            } else {
                log::debug!("{op}: notified while timing out");
                WaitStatus::NoTimeout
            }),
            Err(err) => {
                if self.unregister(op, cell.id()) {
                    Err(err)
                } else {
                    // Already signaled; the notification is not dropped.
                    Ok(WaitStatus::NoTimeout)
                }
            }
        };

        mutex.raw().lock()?;
        let guard = MutexGuard::new(mutex);
        outcome.map(|status| (guard, status))
    }

    /// Remove `cell` from the wait list. Returns `false` if a notifier
    /// already took it.
    fn unregister(&self, op: &'static str, cell: SemaphoreId) -> bool {
        let mut waiters = self.lock_waiters(op);
        match waiters.iter().position(|&id| id == cell) {
            Some(index) => {
                waiters.remove(index);
                true
            }
            None => false,
        }
    }

    fn lock_waiters(&self, op: &'static str) -> MutexGuard<'_, VecDeque<SemaphoreId>> {
        match self.waiters.lock() {
            Ok(waiters) => waiters,
            Err(err) => fatal(Error::new(err.kind(), op).with_reason("wait list lock failed")),
        }
    }

    fn signal(&self, op: &'static str, cell: SemaphoreId) {
        let status = self.kernel.semaphore_release(cell);
        if !status.is_ok() {
            fatal(Error::from_status(op, cell, status));
        }
    }
}

fn still_waiting(condition: bool) -> WaitStatus {
    if condition {
        WaitStatus::Timeout
    } else {
        WaitStatus::NoTimeout
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}
