//! Blocking synchronization primitives.

pub mod condvar;
pub mod mutex;
pub mod semaphore;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard, RawMutex, RecursiveMutex, RecursiveMutexGuard};
pub use semaphore::{BinarySemaphore, Semaphore};
