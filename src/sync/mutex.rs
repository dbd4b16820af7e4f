//! Kernel-backed mutexes.
//!
//! [`RawMutex`] is the bare lock. [`Mutex`] and [`RecursiveMutex`] wrap it
//! around the data they protect and release it through RAII guards; both
//! accept timed lock attempts.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::error::{fatal, kernel_error, misuse, Error, KernelStatus, Result, WaitStatus};
use crate::kernel::{Kernel, MutexAttr, MutexId, ThreadHandle, Ticks, NO_WAIT, WAIT_FOREVER};
use crate::time::{ticks, Duration, Instant};

/// Exclusive kernel lock without associated data.
///
/// Ownership is tracked by the kernel: only the locking thread may unlock.
pub struct RawMutex {
    kernel: &'static dyn Kernel,
    id: MutexId,
    recursive: bool,
}

impl RawMutex {
    pub fn new() -> Result<Self> {
        Self::new_in(crate::os::kernel()?)
    }

    pub fn new_in(kernel: &'static dyn Kernel) -> Result<Self> {
        Self::with_attr(kernel, MutexAttr::new("mutex", false))
    }

    /// Lock the owning thread may re-acquire; each lock needs its unlock.
    pub fn recursive() -> Result<Self> {
        Self::recursive_in(crate::os::kernel()?)
    }

    pub fn recursive_in(kernel: &'static dyn Kernel) -> Result<Self> {
        Self::with_attr(kernel, MutexAttr::new("recursive_mutex", true))
    }

    pub fn with_attr(kernel: &'static dyn Kernel, attr: MutexAttr) -> Result<Self> {
        let id = kernel
            .mutex_new(&attr)
            .ok_or(Error::exhausted("Mutex::new"))?;
        log::trace!("mutex {:#x} created ({})", id.get(), attr.name);
        Ok(Self {
            kernel,
            id,
            recursive: attr.recursive,
        })
    }

    pub fn id(&self) -> MutexId {
        self.id
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Thread currently holding the lock.
    pub fn owner(&self) -> Option<ThreadHandle> {
        self.kernel.mutex_owner(self.id)
    }

    /// Whether the calling thread holds the lock.
    pub fn is_held_by_current(&self) -> bool {
        match (self.owner(), self.kernel.thread_current()) {
            (Some(owner), Some(current)) => owner == current,
            _ => false,
        }
    }

    pub fn lock(&self) -> Result<()> {
        match self.acquire("Mutex::lock", WAIT_FOREVER)? {
            WaitStatus::NoTimeout => Ok(()),
            WaitStatus::Timeout => Err(Error::from_status(
                "Mutex::lock",
                self.id,
                KernelStatus::ErrorTimeout,
            )),
        }
    }

    /// Lock without blocking. Returns `false` if another thread holds it.
    pub fn try_lock(&self) -> Result<bool> {
        Ok(!self.acquire("Mutex::try_lock", NO_WAIT)?.timed_out())
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Result<WaitStatus> {
        const OP: &str = "Mutex::try_lock_for";
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.acquire(OP, ticks)
    }

    pub fn try_lock_until(&self, deadline: Instant) -> Result<WaitStatus> {
        const OP: &str = "Mutex::try_lock_until";
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.acquire(OP, ticks)
    }

    fn acquire(&self, op: &'static str, ticks: Ticks) -> Result<WaitStatus> {
        match self.kernel.mutex_acquire(self.id, ticks) {
            KernelStatus::Ok => Ok(WaitStatus::NoTimeout),
            KernelStatus::ErrorTimeout if ticks != WAIT_FOREVER => Ok(WaitStatus::Timeout),
            KernelStatus::ErrorResource if ticks == NO_WAIT => Ok(WaitStatus::Timeout),
            // A blocking re-lock by the owner of a plain mutex.
            KernelStatus::ErrorResource => Err(misuse(
                Error::illegal_usage(op, "re-lock would deadlock").with_handle(self.id),
            )),
            status => Err(kernel_error(op, self.id, status)),
        }
    }

    /// Release one level of ownership.
    ///
    /// Unlocking a mutex the caller does not hold is illegal usage.
    pub fn unlock(&self) -> Result<()> {
        match self.kernel.mutex_release(self.id) {
            KernelStatus::Ok => Ok(()),
            KernelStatus::ErrorResource => Err(misuse(
                Error::illegal_usage("Mutex::unlock", "mutex not held by caller")
                    .with_handle(self.id),
            )),
            status => Err(kernel_error("Mutex::unlock", self.id, status)),
        }
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        if self.owner().is_some() {
            fatal(
                Error::illegal_usage("Mutex::drop", "mutex destroyed while locked")
                    .with_handle(self.id),
            );
        }
        let status = self.kernel.mutex_delete(self.id);
        if !status.is_ok() {
            fatal(Error::from_status("Mutex::drop", self.id, status));
        }
        log::trace!("mutex {:#x} deleted", self.id.get());
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex")
            .field("id", &self.id)
            .field("recursive", &self.recursive)
            .finish()
    }
}

/// Mutual exclusion around a value of type `T`.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Result<Self> {
        Self::new_in(crate::os::kernel()?, value)
    }

    pub fn new_in(kernel: &'static dyn Kernel, value: T) -> Result<Self> {
        Ok(Self {
            raw: RawMutex::new_in(kernel)?,
            data: UnsafeCell::new(value),
        })
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.raw.lock()?;
        Ok(MutexGuard::new(self))
    }

    pub fn try_lock(&self) -> Result<Option<MutexGuard<'_, T>>> {
        Ok(self.raw.try_lock()?.then(|| MutexGuard::new(self)))
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Result<Option<MutexGuard<'_, T>>> {
        Ok(match self.raw.try_lock_for(timeout)? {
            WaitStatus::NoTimeout => Some(MutexGuard::new(self)),
            WaitStatus::Timeout => None,
        })
    }

    pub fn try_lock_until(&self, deadline: Instant) -> Result<Option<MutexGuard<'_, T>>> {
        Ok(match self.raw.try_lock_until(deadline)? {
            WaitStatus::NoTimeout => Some(MutexGuard::new(self)),
            WaitStatus::Timeout => None,
        })
    }

    /// The underlying lock.
    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").field("raw", &self.raw).finish_non_exhaustive()
    }
}

/// Lock held on a [`Mutex`]; unlocks when dropped.
///
/// Kernel mutexes belong to the thread that locked them, so guards cannot
/// move to another thread.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(crate) fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// Give up the guard without unlocking, returning the mutex.
    pub(crate) fn into_mutex(self) -> &'a Mutex<T> {
        let mutex = self.mutex;
        core::mem::forget(self);
        mutex
    }

    /// Unlock explicitly, reporting a failed release instead of stopping.
    pub fn unlock(self) -> Result<()> {
        self.into_mutex().raw.unlock()
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.raw.unlock() {
            fatal(err);
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Mutex the owning thread may lock again while holding it.
///
/// Guards only give shared access: several may be alive at once on one
/// thread.
pub struct RecursiveMutex<T: ?Sized> {
    raw: RawMutex,
    data: T,
}

unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    pub fn new(value: T) -> Result<Self> {
        Self::new_in(crate::os::kernel()?, value)
    }

    pub fn new_in(kernel: &'static dyn Kernel, value: T) -> Result<Self> {
        Ok(Self {
            raw: RawMutex::recursive_in(kernel)?,
            data: value,
        })
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    pub fn lock(&self) -> Result<RecursiveMutexGuard<'_, T>> {
        self.raw.lock()?;
        Ok(RecursiveMutexGuard::new(self))
    }

    pub fn try_lock(&self) -> Result<Option<RecursiveMutexGuard<'_, T>>> {
        Ok(self.raw.try_lock()?.then(|| RecursiveMutexGuard::new(self)))
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Result<Option<RecursiveMutexGuard<'_, T>>> {
        Ok(match self.raw.try_lock_for(timeout)? {
            WaitStatus::NoTimeout => Some(RecursiveMutexGuard::new(self)),
            WaitStatus::Timeout => None,
        })
    }

    pub fn try_lock_until(
        &self,
        deadline: Instant,
    ) -> Result<Option<RecursiveMutexGuard<'_, T>>> {
        Ok(match self.raw.try_lock_until(deadline)? {
            WaitStatus::NoTimeout => Some(RecursiveMutexGuard::new(self)),
            WaitStatus::Timeout => None,
        })
    }

    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }
}

impl<T: ?Sized> fmt::Debug for RecursiveMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

#[must_use = "if unused the RecursiveMutex will immediately unlock"]
pub struct RecursiveMutexGuard<'a, T: ?Sized> {
    mutex: &'a RecursiveMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> RecursiveMutexGuard<'a, T> {
    fn new(mutex: &'a RecursiveMutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.mutex.data
    }
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.raw.unlock() {
            fatal(err);
        }
    }
}
