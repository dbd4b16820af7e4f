#![no_std]

//! Synchronization primitives over a tick-based real-time kernel.
//!
//! The kernel is reached through the [`Kernel`](kernel::Kernel) trait and
//! offers semaphores, mutexes, flags, timers, threads and queues, but no
//! condition variable. This crate wraps those objects in owned Rust types
//! with uniform timeout handling and builds a [`Condvar`] on top of them.
//!
//! With the `std` feature a simulated kernel, [`host::HostKernel`], runs
//! everything on `std` threads.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod error;
pub mod flags;
pub mod kernel;
pub mod os;
pub mod queue;
pub mod sync;
pub mod thread;
pub mod time;
pub mod timer;

#[cfg(feature = "std")]
pub mod host;

pub use error::{Error, ErrorKind, KernelStatus, Result, WaitStatus};
pub use flags::{EventFlags, ThreadFlags, WaitFlag};
pub use kernel::Kernel;
pub use os::{DispatchLock, OsConfig};
pub use queue::{ByValue, MessageQueue, Owned};
pub use sync::{BinarySemaphore, Condvar, Mutex, MutexGuard, RawMutex, RecursiveMutex, Semaphore};
pub use thread::{this_thread, threads, Thread, ThreadBuilder, ThreadId};
pub use time::{Duration, HighResolutionClock, Instant, SystemClock};
pub use timer::{Timer, TimerControl, TimerMode};
