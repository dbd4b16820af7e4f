//! Kernel threads.
//!
//! A [`Thread`] owns one kernel thread and must be joined or detached
//! before it is dropped.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{fatal, kernel_error, misuse, Error, ErrorKind, KernelStatus, Result};
use crate::kernel::{Kernel, Priority, ThreadAttr, ThreadHandle, ThreadInfo};
use crate::os::DispatchLock;
use crate::time::{ticks, Duration, Instant, SystemClock};

/// Identity of a kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(ThreadHandle);

impl ThreadId {
    pub fn handle(self) -> ThreadHandle {
        self.0
    }
}

impl From<ThreadHandle> for ThreadId {
    fn from(handle: ThreadHandle) -> Self {
        ThreadId(handle)
    }
}

/// Builder for configuring thread creation.
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    attr: ThreadAttr,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self {
            attr: ThreadAttr {
                name: None,
                priority: Priority::NORMAL,
                stack_size: 0,
            },
        }
    }

    pub fn name(mut self, name: &'static str) -> Self {
        self.attr.name = Some(name);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.attr.priority = priority;
        self
    }

    /// Stack size in bytes; 0 keeps the kernel default.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.attr.stack_size = bytes;
        self
    }

    pub fn spawn<F>(self, f: F) -> Result<Thread>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_in(crate::os::kernel()?, f)
    }

    pub fn spawn_in<F>(self, kernel: &'static dyn Kernel, f: F) -> Result<Thread>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = kernel
            .thread_new(Box::new(f), &self.attr)
            .ok_or(Error::exhausted("Thread::spawn"))?;
        log::debug!(
            "thread {:#x} spawned ({})",
            handle.get(),
            self.attr.name.unwrap_or("unnamed")
        );
        Ok(Thread {
            kernel,
            handle,
            joinable: true,
        })
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned kernel thread.
///
/// Dropping a thread that is still joinable stops the program: a handle
/// silently outliving its kernel thread is treated as a bug.
pub struct Thread {
    kernel: &'static dyn Kernel,
    handle: ThreadHandle,
    joinable: bool,
}

impl Thread {
    /// Spawn `f` with default attributes.
    pub fn spawn<F>(f: F) -> Result<Thread>
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadBuilder::new().spawn(f)
    }

    pub fn builder() -> ThreadBuilder {
        ThreadBuilder::new()
    }

    pub fn id(&self) -> ThreadId {
        ThreadId(self.handle)
    }

    pub fn joinable(&self) -> bool {
        self.joinable
    }

    /// Block until the thread finishes.
    ///
    /// Joining a detached or already joined thread, or joining from the
    /// thread itself, is illegal usage.
    pub fn join(&mut self) -> Result<()> {
        const OP: &str = "Thread::join";
        if !self.joinable {
            return Err(misuse(
                Error::illegal_usage(OP, "thread is not joinable").with_handle(self.handle),
            ));
        }
        if self.kernel.thread_current() == Some(self.handle) {
            return Err(misuse(
                Error::illegal_usage(OP, "resource deadlock would occur")
                    .with_handle(self.handle),
            ));
        }
        match self.kernel.thread_join(self.handle) {
            KernelStatus::Ok => {
                self.joinable = false;
                log::debug!("thread {:#x} joined", self.handle.get());
                Ok(())
            }
            KernelStatus::ErrorResource => Err(misuse(
                Error::illegal_usage(OP, "thread is not joinable").with_handle(self.handle),
            )),
            // The thread ran to completion but faulted; the kernel has
            // already reclaimed it.
            KernelStatus::Error => {
                self.joinable = false;
                Err(kernel_error(OP, self.handle, KernelStatus::Error))
            }
            status => Err(kernel_error(OP, self.handle, status)),
        }
    }

    /// Let the thread run on its own; its resources are reclaimed when it
    /// exits.
    pub fn detach(&mut self) -> Result<()> {
        const OP: &str = "Thread::detach";
        if !self.joinable {
            return Err(misuse(
                Error::illegal_usage(OP, "thread is not joinable").with_handle(self.handle),
            ));
        }
        match self.kernel.thread_detach(self.handle) {
            KernelStatus::Ok => {
                self.joinable = false;
                Ok(())
            }
            KernelStatus::ErrorResource => Err(misuse(
                Error::illegal_usage(OP, "thread is not joinable").with_handle(self.handle),
            )),
            status => Err(kernel_error(OP, self.handle, status)),
        }
    }

    pub fn priority(&self) -> Result<Priority> {
        self.kernel.thread_priority(self.handle).ok_or_else(|| {
            Error::from_status("Thread::priority", self.handle, KernelStatus::ErrorParameter)
        })
    }

    pub fn set_priority(&self, priority: Priority) -> Result<()> {
        let status = self.kernel.thread_set_priority(self.handle, priority);
        if status.is_ok() {
            Ok(())
        } else {
            Err(kernel_error("Thread::set_priority", self.handle, status))
        }
    }

    /// Kernel snapshot of the thread, `None` once it is gone.
    pub fn info(&self) -> Option<ThreadInfo> {
        self.kernel.thread_info(self.handle)
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.joinable {
            fatal(
                Error::illegal_usage("Thread::drop", "joinable thread dropped")
                    .with_handle(self.handle),
            );
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("handle", &self.handle)
            .field("joinable", &self.joinable)
            .finish()
    }
}

/// Operations on the calling thread.
pub mod this_thread {
    use super::*;

    pub fn id() -> Result<ThreadId> {
        id_in(crate::os::kernel()?)
    }

    pub fn id_in(kernel: &dyn Kernel) -> Result<ThreadId> {
        kernel.thread_current().map(ThreadId).ok_or_else(|| {
            Error::new(ErrorKind::IllegalUsage, "this_thread::id")
                .with_reason("not called from a thread")
        })
    }

    /// Handle on the flags of the calling thread.
    pub fn flags() -> Result<crate::flags::ThreadFlags> {
        crate::flags::ThreadFlags::new()
    }

    pub fn yield_now() -> Result<()> {
        let kernel = crate::os::kernel()?;
        let status = kernel.thread_yield();
        if status.is_ok() {
            Ok(())
        } else {
            Err(kernel_error("this_thread::yield_now", crate::kernel::KERNEL_HANDLE, status))
        }
    }

    /// Sleep for at least `duration`. Zero returns at once; negative fails.
    pub fn sleep_for(duration: Duration) -> Result<()> {
        sleep_for_in(crate::os::kernel()?, duration)
    }

    pub fn sleep_for_in(kernel: &dyn Kernel, duration: Duration) -> Result<()> {
        const OP: &str = "this_thread::sleep_for";
        let ticks = ticks::timeout_ticks(kernel, OP, duration)?;
        delay(kernel, OP, ticks)
    }

    /// Sleep until `deadline`; a deadline already passed returns at once.
    pub fn sleep_until(deadline: Instant) -> Result<()> {
        let kernel = crate::os::kernel()?;
        let remaining = deadline - SystemClock::now_in(kernel)?;
        if remaining.is_negative() || remaining.is_zero() {
            return Ok(());
        }
        let ticks = ticks::timeout_ticks(kernel, "this_thread::sleep_until", remaining)?;
        delay(kernel, "this_thread::sleep_until", ticks)
    }

    fn delay(kernel: &dyn Kernel, op: &'static str, ticks: crate::kernel::Ticks) -> Result<()> {
        if ticks == crate::kernel::NO_WAIT {
            return Ok(());
        }
        let status = kernel.thread_delay(ticks);
        if status.is_ok() {
            Ok(())
        } else {
            Err(kernel_error(op, crate::kernel::KERNEL_HANDLE, status))
        }
    }
}

/// Process-wide thread queries.
pub mod threads {
    use super::*;

    /// Live kernel threads.
    pub fn count() -> Result<usize> {
        Ok(crate::os::kernel()?.thread_count())
    }

    /// Snapshot of every live thread, taken with the scheduler locked.
    pub fn enumerate() -> Result<Vec<ThreadInfo>> {
        enumerate_in(crate::os::kernel()?)
    }

    pub fn enumerate_in(kernel: &'static dyn Kernel) -> Result<Vec<ThreadInfo>> {
        let _lock = DispatchLock::new_in(kernel)?;
        Ok(kernel
            .thread_enumerate()
            .into_iter()
            .filter_map(|handle| kernel.thread_info(handle))
            .collect())
    }
}
