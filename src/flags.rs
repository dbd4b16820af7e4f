//! Event flags and thread flags.
//!
//! Both are 31-bit masks a thread can block on until any or all of a set of
//! bits are raised. Waits return the flags observed before the matched bits
//! were cleared.

use bitflags::bitflags;

use crate::error::{fatal, kernel_error, wait_status, Error, KernelStatus, RawHandle, Result};
use crate::kernel::{
    EventFlagsId, FlagsWait, Kernel, Ticks, FLAGS_MASK, KERNEL_HANDLE, NO_WAIT, WAIT_FOREVER,
};
use crate::thread::ThreadId;
use crate::time::{ticks, Duration, Instant};

bitflags! {
    /// Match policy of a flag wait.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WaitFlag: u32 {
        /// Return when any bit of the mask is set.
        const ANY = 0;
        /// Return when every bit of the mask is set.
        const ALL = 1;
        /// Leave the matched bits set.
        const NO_CLEAR = 2;
    }
}

impl WaitFlag {
    fn options(self) -> FlagsWait {
        FlagsWait {
            all: self.contains(WaitFlag::ALL),
            no_clear: self.contains(WaitFlag::NO_CLEAR),
        }
    }
}

impl Default for WaitFlag {
    fn default() -> Self {
        WaitFlag::ANY
    }
}

fn check_mask(op: &'static str, mask: u32) -> Result<()> {
    if mask & !FLAGS_MASK != 0 {
        return Err(Error::invalid_argument(op, "flag mask uses bit 31"));
    }
    Ok(())
}

fn check_wait_mask(op: &'static str, mask: u32) -> Result<()> {
    if mask == 0 {
        return Err(Error::invalid_argument(op, "empty wait mask"));
    }
    check_mask(op, mask)
}

/// Map a flag wait result; `None` means the wait timed out.
fn waited(
    op: &'static str,
    handle: impl Into<RawHandle>,
    result: core::result::Result<u32, KernelStatus>,
    ticks: Ticks,
) -> Result<Option<u32>> {
    match result {
        Ok(flags) => Ok(Some(flags)),
        Err(status) => wait_status(op, handle, status, ticks).map(|_| None),
    }
}

/// Kernel event flags object shared between threads.
pub struct EventFlags {
    kernel: &'static dyn Kernel,
    id: EventFlagsId,
}

impl EventFlags {
    pub fn new() -> Result<Self> {
        Self::new_in(crate::os::kernel()?)
    }

    pub fn new_in(kernel: &'static dyn Kernel) -> Result<Self> {
        let id = kernel
            .event_flags_new()
            .ok_or(Error::exhausted("EventFlags::new"))?;
        log::trace!("event flags {:#x} created", id.get());
        Ok(Self { kernel, id })
    }

    pub fn id(&self) -> EventFlagsId {
        self.id
    }

    pub fn get(&self) -> Result<u32> {
        self.kernel
            .event_flags_get(self.id)
            .map_err(|status| kernel_error("EventFlags::get", self.id, status))
    }

    /// Raise `mask`, returning the flags after setting.
    pub fn set(&self, mask: u32) -> Result<u32> {
        check_mask("EventFlags::set", mask)?;
        self.kernel
            .event_flags_set(self.id, mask)
            .map_err(|status| kernel_error("EventFlags::set", self.id, status))
    }

    /// Lower `mask`, returning the flags before clearing.
    pub fn clear(&self, mask: u32) -> Result<u32> {
        check_mask("EventFlags::clear", mask)?;
        self.kernel
            .event_flags_clear(self.id, mask)
            .map_err(|status| kernel_error("EventFlags::clear", self.id, status))
    }

    /// Block until `mask` matches under `policy`.
    pub fn wait(&self, mask: u32, policy: WaitFlag) -> Result<u32> {
        const OP: &str = "EventFlags::wait";
        check_wait_mask(OP, mask)?;
        let observed = self.wait_ticks(OP, mask, policy, WAIT_FOREVER)?;
        Ok(observed.unwrap_or_default())
    }

    /// Returns `None` if `timeout` elapsed first.
    pub fn wait_for(&self, mask: u32, policy: WaitFlag, timeout: Duration) -> Result<Option<u32>> {
        const OP: &str = "EventFlags::wait_for";
        check_wait_mask(OP, mask)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.wait_ticks(OP, mask, policy, ticks)
    }

    pub fn wait_until(
        &self,
        mask: u32,
        policy: WaitFlag,
        deadline: Instant,
    ) -> Result<Option<u32>> {
        const OP: &str = "EventFlags::wait_until";
        check_wait_mask(OP, mask)?;
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.wait_ticks(OP, mask, policy, ticks)
    }

    fn wait_ticks(
        &self,
        op: &'static str,
        mask: u32,
        policy: WaitFlag,
        ticks: Ticks,
    ) -> Result<Option<u32>> {
        let result = self
            .kernel
            .event_flags_wait(self.id, mask, policy.options(), ticks);
        waited(op, self.id, result, ticks)
    }
}

impl Drop for EventFlags {
    fn drop(&mut self) {
        let status = self.kernel.event_flags_delete(self.id);
        if !status.is_ok() {
            fatal(Error::from_status("EventFlags::drop", self.id, status));
        }
        log::trace!("event flags {:#x} deleted", self.id.get());
    }
}

impl core::fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventFlags").field("id", &self.id).finish()
    }
}

/// Flags private to each kernel thread.
///
/// Any thread may raise another thread's flags; only the owner reads,
/// clears or waits on them.
#[derive(Clone, Copy)]
pub struct ThreadFlags {
    kernel: &'static dyn Kernel,
}

impl ThreadFlags {
    pub fn new() -> Result<Self> {
        Ok(Self::new_in(crate::os::kernel()?))
    }

    pub fn new_in(kernel: &'static dyn Kernel) -> Self {
        Self { kernel }
    }

    /// Raise `mask` on `thread`, returning its flags after setting.
    pub fn set(&self, thread: ThreadId, mask: u32) -> Result<u32> {
        check_mask("ThreadFlags::set", mask)?;
        self.kernel
            .thread_flags_set(thread.handle(), mask)
            .map_err(|status| kernel_error("ThreadFlags::set", thread.handle(), status))
    }

    /// Flags of the calling thread.
    pub fn get(&self) -> Result<u32> {
        self.kernel
            .thread_flags_get()
            .map_err(|status| kernel_error("ThreadFlags::get", KERNEL_HANDLE, status))
    }

    pub fn clear(&self, mask: u32) -> Result<u32> {
        check_mask("ThreadFlags::clear", mask)?;
        self.kernel
            .thread_flags_clear(mask)
            .map_err(|status| kernel_error("ThreadFlags::clear", KERNEL_HANDLE, status))
    }

    pub fn wait(&self, mask: u32, policy: WaitFlag) -> Result<u32> {
        const OP: &str = "ThreadFlags::wait";
        check_wait_mask(OP, mask)?;
        Ok(self.wait_ticks(OP, mask, policy, WAIT_FOREVER)?.unwrap_or_default())
    }

    pub fn try_wait(&self, mask: u32, policy: WaitFlag) -> Result<Option<u32>> {
        const OP: &str = "ThreadFlags::try_wait";
        check_wait_mask(OP, mask)?;
        self.wait_ticks(OP, mask, policy, NO_WAIT)
    }

    pub fn wait_for(&self, mask: u32, policy: WaitFlag, timeout: Duration) -> Result<Option<u32>> {
        const OP: &str = "ThreadFlags::wait_for";
        check_wait_mask(OP, mask)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.wait_ticks(OP, mask, policy, ticks)
    }

    pub fn wait_until(
        &self,
        mask: u32,
        policy: WaitFlag,
        deadline: Instant,
    ) -> Result<Option<u32>> {
        const OP: &str = "ThreadFlags::wait_until";
        check_wait_mask(OP, mask)?;
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.wait_ticks(OP, mask, policy, ticks)
    }

    fn wait_ticks(
        &self,
        op: &'static str,
        mask: u32,
        policy: WaitFlag,
        ticks: Ticks,
    ) -> Result<Option<u32>> {
        let result = self.kernel.thread_flags_wait(mask, policy.options(), ticks);
        waited(op, KERNEL_HANDLE, result, ticks)
    }
}

impl core::fmt::Debug for ThreadFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadFlags").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn policy_bits() {
        assert_eq!(WaitFlag::ANY.options(), FlagsWait { all: false, no_clear: false });
        assert_eq!(
            (WaitFlag::ALL | WaitFlag::NO_CLEAR).options(),
            FlagsWait { all: true, no_clear: true }
        );
        assert_eq!(WaitFlag::default(), WaitFlag::ANY);
    }

    #[test]
    fn masks_are_checked_locally() {
        assert!(check_mask("t", FLAGS_MASK).is_ok());
        assert_eq!(check_mask("t", 1 << 31).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(check_wait_mask("t", 0).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
