//! Contract of the underlying tick-based kernel.
//!
//! This module defines the [`Kernel`] trait every primitive in the crate is
//! built on. The trait mirrors a C-style RTOS interface: objects are opaque
//! integer handles, every blocking call takes a 32-bit tick timeout and
//! reports a [`KernelStatus`]. Implementations are expected to be thin
//! forwarding layers over a real kernel; the `std` feature ships a hosted
//! implementation in [`crate::host`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::MaybeUninit;
use core::num::NonZeroUsize;

use crate::error::{KernelStatus, RawHandle};

/// Kernel timeout, in ticks.
pub type Ticks = u32;

/// Do not block: poll the object once.
pub const NO_WAIT: Ticks = 0;

/// Reserved timeout value meaning "block indefinitely".
pub const WAIT_FOREVER: Ticks = u32::MAX;

/// Flag bits usable in event and thread flag masks.
pub const FLAGS_MASK: u32 = 0x7FFF_FFFF;

macro_rules! kernel_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw kernel identifier.
            pub const fn new(raw: NonZeroUsize) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> usize {
                self.0.get()
            }
        }

        impl From<$name> for RawHandle {
            fn from(id: $name) -> Self {
                RawHandle(id.get())
            }
        }
    };
}

kernel_id!(
    /// Kernel semaphore object.
    SemaphoreId
);
kernel_id!(
    /// Kernel mutex object.
    MutexId
);
kernel_id!(
    /// Kernel event flags object.
    EventFlagsId
);
kernel_id!(
    /// Kernel software timer.
    TimerId
);
kernel_id!(
    /// Kernel message queue.
    QueueId
);
kernel_id!(
    /// Kernel thread.
    ThreadHandle
);

/// Handle used for kernel-wide calls that do not involve an object.
pub(crate) const KERNEL_HANDLE: RawHandle = RawHandle(0);

/// Attributes of a kernel mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexAttr {
    pub name: &'static str,
    /// The owning thread may re-lock; the kernel counts the depth.
    pub recursive: bool,
    pub priority_inherit: bool,
}

impl MutexAttr {
    pub const fn new(name: &'static str, recursive: bool) -> Self {
        Self {
            name,
            recursive,
            priority_inherit: true,
        }
    }
}

/// Options of a flag wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagsWait {
    /// Every bit of the mask must be set, instead of any of them.
    pub all: bool,
    /// Leave the matched bits set after the wait returns.
    pub no_clear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Once,
    Periodic,
}

/// Thread priority, higher value means more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Priority = Priority(1);
    pub const LOW: Priority = Priority(8);
    pub const BELOW_NORMAL: Priority = Priority(16);
    pub const NORMAL: Priority = Priority(24);
    pub const ABOVE_NORMAL: Priority = Priority(32);
    pub const HIGH: Priority = Priority(40);
    pub const REALTIME: Priority = Priority(48);
    pub const ISR: Priority = Priority(56);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Attributes used when creating a kernel thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAttr {
    pub name: Option<&'static str>,
    pub priority: Priority,
    /// Stack size in bytes, 0 selects the kernel default.
    pub stack_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Inactive,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Snapshot of a kernel thread, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub handle: ThreadHandle,
    pub name: Option<&'static str>,
    pub state: ThreadState,
    pub priority: Priority,
    pub stack_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Inactive,
    Ready,
    Running,
    Locked,
    Suspended,
    Error,
}

/// Kernel identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelVersion {
    pub api: u32,
    pub kernel: u32,
    pub id: &'static str,
}

/// Function run by a newly created kernel thread.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Function dispatched by the timer service when a timer expires.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Entry points of the underlying kernel.
///
/// Status contract shared by all blocking calls:
///
/// * a call with [`NO_WAIT`] on an unavailable object returns
///   [`KernelStatus::ErrorResource`];
/// * a finite timeout that expires returns [`KernelStatus::ErrorTimeout`];
/// * [`WAIT_FOREVER`] never times out;
/// * blocking calls from interrupt context return [`KernelStatus::ErrorIsr`].
///
/// Object creation returns `None` when the kernel cannot allocate the object.
pub trait Kernel: Send + Sync {
    // Clock.

    fn tick_count(&self) -> u64;

    /// Tick frequency in Hz; 0 means the kernel is not configured.
    fn tick_frequency(&self) -> u32;

    fn sys_timer_count(&self) -> u64;

    fn sys_timer_frequency(&self) -> u32;

    // Kernel control.

    fn version(&self) -> KernelVersion;

    fn state(&self) -> KernelState;

    fn initialize(&self) -> KernelStatus;

    fn start(&self) -> KernelStatus;

    /// Lock the scheduler, returning the previous lock state.
    fn lock(&self) -> Result<bool, KernelStatus>;

    /// Restore a lock state returned by [`Kernel::lock`], returning the
    /// state it replaced.
    fn restore_lock(&self, locked: bool) -> Result<bool, KernelStatus>;

    // Semaphores.

    fn semaphore_new(&self, max: u32, initial: u32) -> Option<SemaphoreId>;

    fn semaphore_delete(&self, id: SemaphoreId) -> KernelStatus;

    fn semaphore_acquire(&self, id: SemaphoreId, timeout: Ticks) -> KernelStatus;

    /// Returns [`KernelStatus::ErrorResource`] when the count is at its max.
    fn semaphore_release(&self, id: SemaphoreId) -> KernelStatus;

    fn semaphore_count(&self, id: SemaphoreId) -> u32;

    // Mutexes.

    fn mutex_new(&self, attr: &MutexAttr) -> Option<MutexId>;

    fn mutex_delete(&self, id: MutexId) -> KernelStatus;

    /// Returns [`KernelStatus::ErrorResource`] on a non-recursive re-lock by
    /// the owner.
    fn mutex_acquire(&self, id: MutexId, timeout: Ticks) -> KernelStatus;

    /// Returns [`KernelStatus::ErrorResource`] when the caller is not the
    /// owner.
    fn mutex_release(&self, id: MutexId) -> KernelStatus;

    fn mutex_owner(&self, id: MutexId) -> Option<ThreadHandle>;

    // Event flags.

    fn event_flags_new(&self) -> Option<EventFlagsId>;

    fn event_flags_delete(&self, id: EventFlagsId) -> KernelStatus;

    fn event_flags_set(&self, id: EventFlagsId, mask: u32) -> Result<u32, KernelStatus>;

    fn event_flags_clear(&self, id: EventFlagsId, mask: u32) -> Result<u32, KernelStatus>;

    fn event_flags_get(&self, id: EventFlagsId) -> Result<u32, KernelStatus>;

    /// Returns the flags observed before any clearing.
    fn event_flags_wait(
        &self,
        id: EventFlagsId,
        mask: u32,
        options: FlagsWait,
        timeout: Ticks,
    ) -> Result<u32, KernelStatus>;

    // Threads.

    fn thread_new(&self, entry: ThreadEntry, attr: &ThreadAttr) -> Option<ThreadHandle>;

    fn thread_current(&self) -> Option<ThreadHandle>;

    /// Wait for `thread` to finish and reclaim it. `Error` means the thread
    /// faulted; it is reclaimed all the same.
    fn thread_join(&self, thread: ThreadHandle) -> KernelStatus;

    fn thread_detach(&self, thread: ThreadHandle) -> KernelStatus;

    fn thread_yield(&self) -> KernelStatus;

    fn thread_delay(&self, ticks: Ticks) -> KernelStatus;

    fn thread_set_priority(&self, thread: ThreadHandle, priority: Priority) -> KernelStatus;

    fn thread_priority(&self, thread: ThreadHandle) -> Option<Priority>;

    fn thread_count(&self) -> usize;

    fn thread_enumerate(&self) -> Vec<ThreadHandle>;

    fn thread_info(&self, thread: ThreadHandle) -> Option<ThreadInfo>;

    // Thread flags.

    fn thread_flags_set(&self, thread: ThreadHandle, mask: u32) -> Result<u32, KernelStatus>;

    /// Flags of the calling thread.
    fn thread_flags_get(&self) -> Result<u32, KernelStatus>;

    fn thread_flags_clear(&self, mask: u32) -> Result<u32, KernelStatus>;

    fn thread_flags_wait(
        &self,
        mask: u32,
        options: FlagsWait,
        timeout: Ticks,
    ) -> Result<u32, KernelStatus>;

    // Timers.

    fn timer_new(&self, callback: TimerCallback, kind: TimerKind) -> Option<TimerId>;

    fn timer_delete(&self, id: TimerId) -> KernelStatus;

    fn timer_start(&self, id: TimerId, ticks: Ticks) -> KernelStatus;

    /// Returns [`KernelStatus::ErrorResource`] when the timer is not running.
    fn timer_stop(&self, id: TimerId) -> KernelStatus;

    fn timer_is_running(&self, id: TimerId) -> bool;

    // Message queues.

    fn queue_new(&self, capacity: usize, msg_size: usize) -> Option<QueueId>;

    fn queue_delete(&self, id: QueueId) -> KernelStatus;

    /// Copy `msg` (exactly `msg_size` bytes) into the queue.
    ///
    /// Messages are opaque and may contain padding, so the kernel copies
    /// them without inspecting any byte.
    fn queue_put(&self, id: QueueId, msg: &[MaybeUninit<u8>], timeout: Ticks) -> KernelStatus;

    /// Copy the oldest message into `msg` (exactly `msg_size` bytes).
    fn queue_get(
        &self,
        id: QueueId,
        msg: &mut [MaybeUninit<u8>],
        timeout: Ticks,
    ) -> KernelStatus;

    fn queue_len(&self, id: QueueId) -> usize;

    fn queue_capacity(&self, id: QueueId) -> usize;
}
