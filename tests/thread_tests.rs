//! Thread lifecycle, identity and thread flags against the hosted kernel.

#![cfg(feature = "std")]

extern crate std;

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use rtos_sync::kernel::{Priority, ThreadState};
use rtos_sync::{
    this_thread, threads, BinarySemaphore, Duration, ErrorKind, Kernel, KernelStatus, Thread,
    ThreadFlags, WaitFlag,
};

#[test]
fn test_join_waits_for_completion() {
    let kernel = common::kernel();
    let done = Arc::new(AtomicBool::new(false));
    let thread_done = Arc::clone(&done);
    let mut thread = Thread::builder()
        .spawn_in(kernel, move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            thread_done.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(thread.joinable());
    thread.join().unwrap();
    assert!(!thread.joinable());
    assert!(done.load(Ordering::SeqCst));
    assert!(thread.info().is_none());
}

#[test]
fn test_join_reports_panicked_thread() {
    let kernel = common::kernel();
    let mut thread = Thread::builder()
        .spawn_in(kernel, || panic!("worker failed"))
        .unwrap();
    let err = thread.join().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KernelFault);
    assert!(!thread.joinable());
    // Reclaimed despite the fault, so the handle drops cleanly.
    assert!(thread.info().is_none());
    drop(thread);
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
fn test_join_after_fault_is_illegal() {
    let kernel = common::kernel();
    let mut thread = Thread::builder()
        .spawn_in(kernel, || panic!("worker failed"))
        .unwrap();
    assert_eq!(thread.join().unwrap_err().kind(), ErrorKind::KernelFault);
    let err = thread.join().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalUsage);
    assert_eq!(err.reason(), Some("thread is not joinable"));
}

#[test]
fn test_detached_thread_is_reclaimed() {
    let kernel = common::kernel();
    let release = Arc::new(BinarySemaphore::new_in(kernel, false).unwrap());
    let thread_release = Arc::clone(&release);
    let mut thread = Thread::builder()
        .spawn_in(kernel, move || thread_release.acquire().unwrap())
        .unwrap();

    thread.detach().unwrap();
    assert!(!thread.joinable());
    assert!(thread.info().is_some());

    release.release().unwrap();
    common::eventually("detached thread to be reclaimed", || thread.info().is_none());
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
fn test_join_after_detach_is_illegal() {
    let kernel = common::kernel();
    let mut thread = Thread::builder().spawn_in(kernel, || {}).unwrap();
    thread.detach().unwrap();

    let err = thread.join().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalUsage);
    assert_eq!(err.reason(), Some("thread is not joinable"));
    assert_eq!(thread.detach().unwrap_err().kind(), ErrorKind::IllegalUsage);
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
fn test_self_join_is_illegal() {
    let kernel = common::kernel();
    let slot: Arc<std::sync::Mutex<Option<Thread>>> = Arc::new(std::sync::Mutex::new(None));
    let (start_tx, start_rx) = mpsc::channel::<()>();
    let (result_tx, result_rx) = mpsc::channel();

    let thread_slot = Arc::clone(&slot);
    let thread = Thread::builder()
        .spawn_in(kernel, move || {
            start_rx.recv().unwrap();
            let mut slot = thread_slot.lock().unwrap();
            let own = slot.as_mut().unwrap();
            let err = own.join().unwrap_err();
            result_tx.send((err.kind(), err.reason(), own.joinable())).unwrap();
        })
        .unwrap();
    *slot.lock().unwrap() = Some(thread);
    start_tx.send(()).unwrap();

    let (kind, reason, joinable) = result_rx.recv().unwrap();
    assert_eq!(kind, ErrorKind::IllegalUsage);
    assert_eq!(reason, Some("resource deadlock would occur"));
    assert!(joinable);

    let mut thread = slot.lock().unwrap().take().unwrap();
    thread.join().unwrap();
}

#[cfg(not(feature = "abort-on-misuse"))]
#[test]
#[should_panic(expected = "joinable thread dropped")]
fn test_dropping_joinable_thread_is_fatal() {
    let kernel = common::kernel();
    let thread = Thread::builder().spawn_in(kernel, || {}).unwrap();
    drop(thread);
}

#[test]
fn test_this_thread_id_matches_handle() {
    let kernel = common::kernel();
    let (tx, rx) = mpsc::channel();
    let mut thread = Thread::builder()
        .spawn_in(kernel, move || {
            tx.send(this_thread::id_in(kernel).unwrap()).unwrap();
        })
        .unwrap();
    let seen = rx.recv().unwrap();
    assert_eq!(seen, thread.id());
    thread.join().unwrap();

    // The test thread is adopted on first use and keeps its identity.
    let me = this_thread::id_in(kernel).unwrap();
    assert_eq!(this_thread::id_in(kernel).unwrap(), me);
    assert_ne!(me, seen);
}

#[test]
fn test_adopted_thread_cannot_be_joined() {
    let kernel = common::kernel();
    let me = kernel.thread_current().unwrap();
    assert!(kernel.thread_info(me).is_some());

    let outcome = std::thread::spawn(move || {
        (kernel.thread_join(me), kernel.thread_detach(me))
    })
    .join()
    .unwrap();
    assert_eq!(outcome, (KernelStatus::ErrorResource, KernelStatus::ErrorResource));
    assert!(kernel.thread_info(me).is_some());
}

#[test]
fn test_sleep_for_waits_at_least_the_duration() {
    let kernel = common::kernel();
    let started = std::time::Instant::now();
    this_thread::sleep_for_in(kernel, Duration::from_millis(10)).unwrap();
    assert!(started.elapsed() >= std::time::Duration::from_millis(10));

    let started = std::time::Instant::now();
    this_thread::sleep_for_in(kernel, Duration::ZERO).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_millis(50));
}

#[test]
fn test_enumerate_lists_live_threads() {
    let kernel = common::kernel();
    let release = Arc::new(BinarySemaphore::new_in(kernel, false).unwrap());
    let thread_release = Arc::clone(&release);
    let mut worker = Thread::builder()
        .name("worker")
        .priority(Priority::ABOVE_NORMAL)
        .spawn_in(kernel, move || thread_release.acquire().unwrap())
        .unwrap();

    common::eventually("worker to block", || {
        worker.info().map(|info| info.state) == Some(ThreadState::Blocked)
    });
    let listed = threads::enumerate_in(kernel).unwrap();
    let info = listed
        .iter()
        .find(|info| info.handle == worker.id().handle())
        .expect("worker is listed");
    assert_eq!(info.name, Some("worker"));
    assert_eq!(info.priority, Priority::ABOVE_NORMAL);

    release.release().unwrap();
    worker.join().unwrap();
    let listed = threads::enumerate_in(kernel).unwrap();
    assert!(listed.iter().all(|info| info.handle != worker.id().handle()));
}

#[test]
fn test_priority_round_trip() {
    let kernel = common::kernel();
    let release = Arc::new(BinarySemaphore::new_in(kernel, false).unwrap());
    let thread_release = Arc::clone(&release);
    let mut thread = Thread::builder()
        .priority(Priority::HIGH)
        .spawn_in(kernel, move || thread_release.acquire().unwrap())
        .unwrap();

    assert_eq!(thread.priority().unwrap(), Priority::HIGH);
    thread.set_priority(Priority::LOW).unwrap();
    assert_eq!(thread.priority().unwrap(), Priority::LOW);
    assert_eq!(
        thread.set_priority(Priority(0)).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    release.release().unwrap();
    thread.join().unwrap();
}

#[test]
fn test_thread_flags_wait_all() {
    let kernel = common::kernel();
    let (tx, rx) = mpsc::channel();
    let mut thread = Thread::builder()
        .spawn_in(kernel, move || {
            let flags = ThreadFlags::new_in(kernel);
            let seen = flags.wait(0b11, WaitFlag::ALL).unwrap();
            tx.send((seen, flags.get().unwrap())).unwrap();
        })
        .unwrap();

    let flags = ThreadFlags::new_in(kernel);
    flags.set(thread.id(), 0b01).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    flags.set(thread.id(), 0b10).unwrap();

    let (seen, after) = rx.recv().unwrap();
    assert_eq!(seen, 0b11);
    assert_eq!(after, 0);
    thread.join().unwrap();
}

#[test]
fn test_thread_flags_try_wait_and_timeout() {
    let kernel = common::kernel();
    let flags = ThreadFlags::new_in(kernel);
    assert_eq!(flags.try_wait(0b1, WaitFlag::ANY).unwrap(), None);
    assert_eq!(
        flags.wait_for(0b1, WaitFlag::ANY, Duration::from_millis(2)).unwrap(),
        None
    );

    let me = this_thread::id_in(kernel).unwrap();
    flags.set(me, 0b101).unwrap();
    assert_eq!(flags.try_wait(0b100, WaitFlag::ANY | WaitFlag::NO_CLEAR).unwrap(), Some(0b101));
    assert_eq!(flags.clear(0b001).unwrap(), 0b101);
    assert_eq!(flags.try_wait(0b100, WaitFlag::ANY).unwrap(), Some(0b100));
    assert_eq!(flags.get().unwrap(), 0);
}
