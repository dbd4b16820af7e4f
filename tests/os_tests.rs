//! Process-wide kernel installation, hooks and the dispatch lock.
//!
//! These tests share one installed kernel, so they live in their own test
//! binary.

#![cfg(feature = "std")]

extern crate std;

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rtos_sync::host::{HostConfig, HostKernel};
use rtos_sync::kernel::KernelState;
use rtos_sync::{
    os, this_thread, threads, Condvar, DispatchLock, Duration, Error, Kernel, Mutex, OsConfig,
    Semaphore, Thread, Timer, TimerMode, WaitStatus,
};

static IDLE_RUNS: AtomicUsize = AtomicUsize::new(0);
static FATAL_ERRORS: std::sync::Mutex<std::vec::Vec<&'static str>> =
    std::sync::Mutex::new(std::vec::Vec::new());

fn on_idle() {
    IDLE_RUNS.fetch_add(1, Ordering::SeqCst);
}

fn on_error(err: &Error) {
    FATAL_ERRORS.lock().unwrap().push(err.op());
}

/// Install a 500 Hz kernel with both hooks, once per test binary.
fn installed() -> &'static HostKernel {
    static KERNEL: OnceLock<&'static HostKernel> = OnceLock::new();
    KERNEL.get_or_init(|| {
        let kernel: &'static HostKernel =
            std::boxed::Box::leak(std::boxed::Box::new(HostKernel::with_config(
                HostConfig::new().tick_frequency(500),
            )));
        assert_eq!(kernel.state(), KernelState::Inactive);
        os::initialize(
            kernel,
            OsConfig {
                idle_hook: Some(on_idle),
                error_hook: Some(on_error),
            },
        )
        .unwrap();
        assert_eq!(kernel.state(), KernelState::Ready);
        os::start().unwrap();
        kernel
    })
}

#[test]
fn test_initialize_installs_kernel() {
    let kernel = installed();
    assert_eq!(kernel.state(), KernelState::Running);
    assert_eq!(os::version().unwrap().id, "host-kernel");
    assert_eq!(os::tick_frequency().unwrap(), 500);
    assert!(os::config().idle_hook.is_some());
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
fn test_second_initialize_is_illegal() {
    installed();
    let other = HostKernel::leak_default();
    let err = os::initialize(other, OsConfig::default()).unwrap_err();
    assert_eq!(err.kind(), rtos_sync::ErrorKind::IllegalUsage);
    assert_eq!(os::tick_frequency().unwrap(), 500);
}

#[test]
fn test_default_constructors_use_installed_kernel() {
    let kernel = installed();
    let before = kernel.calls();

    let sem = Semaphore::new(0, 1).unwrap();
    sem.release(1).unwrap();
    assert_eq!(sem.try_acquire_for(Duration::from_millis(10)).unwrap(), WaitStatus::NoTimeout);
    assert!(kernel.calls() > before);

    let mutex = Mutex::new(0u8).unwrap();
    let cond = Condvar::new().unwrap();
    let (guard, status) = cond.wait_for(mutex.lock().unwrap(), Duration::from_millis(4)).unwrap();
    assert_eq!(status, WaitStatus::Timeout);
    drop(guard);

    this_thread::sleep_for(Duration::from_millis(2)).unwrap();
    this_thread::yield_now().unwrap();

    let mut thread = Thread::spawn(|| {}).unwrap();
    assert!(threads::count().unwrap() >= 1);
    thread.join().unwrap();
}

#[test]
fn test_dispatch_lock_nests() {
    let kernel = installed();
    assert!(!DispatchLock::locked(kernel));
    {
        let _outer = DispatchLock::new().unwrap();
        assert!(DispatchLock::locked(kernel));
        {
            let _inner = DispatchLock::new().unwrap();
            assert!(DispatchLock::locked(kernel));
        }
        assert!(DispatchLock::locked(kernel));
    }
    assert!(!DispatchLock::locked(kernel));
}

#[test]
fn test_idle_hook_runs_on_timer_service() {
    installed();
    let before = IDLE_RUNS.load(Ordering::SeqCst);
    let timer = Timer::new(Duration::from_millis(4), TimerMode::Once, || true).unwrap();
    timer.start().unwrap();
    common::eventually("idle hook", || IDLE_RUNS.load(Ordering::SeqCst) > before);
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
fn test_error_hook_sees_fatal_errors() {
    installed();
    let thread = Thread::spawn(|| {}).unwrap();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || drop(thread)));
    assert!(outcome.is_err());
    assert!(FATAL_ERRORS.lock().unwrap().contains(&"Thread::drop"));
}
