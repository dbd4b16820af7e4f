//! Condition variable behaviour against the hosted kernel.

#![cfg(feature = "std")]

extern crate std;

mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::vec::Vec;

use rtos_sync::host::{HostConfig, HostKernel};
use rtos_sync::{Condvar, Duration, ErrorKind, Mutex, SystemClock, Thread, WaitStatus};

struct Gate {
    released: Mutex<bool>,
    cond: Condvar,
}

fn gate(kernel: &'static HostKernel) -> Arc<Gate> {
    Arc::new(Gate {
        released: Mutex::new_in(kernel, false).unwrap(),
        cond: Condvar::new_in(kernel).unwrap(),
    })
}

fn no_lost_wakeup(waiters: usize) {
    let kernel = common::kernel_with(HostConfig::new().max_objects(4 * waiters + 16));
    let gate = gate(kernel);
    let woken = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for i in 0..waiters {
        let gate = Arc::clone(&gate);
        let woken = Arc::clone(&woken);
        let delay = common::Jitter::new(i as u64).next_micros(500);
        let thread = Thread::builder()
            .stack_size(64 * 1024)
            .spawn_in(kernel, move || {
                std::thread::sleep(std::time::Duration::from_micros(delay));
                let guard = gate.released.lock().unwrap();
                let _guard = gate.cond.wait_while(guard, |released| !*released).unwrap();
                woken.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        threads.push(thread);
    }

    common::eventually("every waiter to register", || {
        gate.cond.waiters().unwrap() == waiters
    });
    {
        let mut released = gate.released.lock().unwrap();
        *released = true;
        assert_eq!(gate.cond.notify_all(), waiters);
    }

    for thread in &mut threads {
        thread.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), waiters);
    assert_eq!(gate.cond.waiters().unwrap(), 0);
}

#[test]
fn test_notify_all_wakes_one_waiter() {
    no_lost_wakeup(1);
}

#[test]
fn test_notify_all_wakes_two_waiters() {
    no_lost_wakeup(2);
}

#[test]
fn test_notify_all_wakes_ten_waiters() {
    no_lost_wakeup(10);
}

#[test]
fn test_notify_all_wakes_thousand_waiters() {
    no_lost_wakeup(1000);
}

/// Waiters registered in order T1, T2, T3 wake in that order.
#[test]
fn test_notify_one_is_fifo() {
    let kernel = common::kernel();
    let order = Arc::new(Mutex::new_in(kernel, Vec::new()).unwrap());
    let cond = Arc::new(Condvar::new_in(kernel).unwrap());

    let mut threads = Vec::new();
    for i in 1..=3 {
        let order = Arc::clone(&order);
        let cond_for_thread = Arc::clone(&cond);
        threads.push(
            Thread::builder()
                .spawn_in(kernel, move || {
                    let guard = order.lock().unwrap();
                    let mut guard = cond_for_thread.wait(guard).unwrap();
                    guard.push(i);
                })
                .unwrap(),
        );
        common::eventually("waiter registration", || cond.waiters().unwrap() == i);
    }

    for woken in 1..=3 {
        assert!(cond.notify_one());
        common::eventually("woken waiter", || order.lock().unwrap().len() == woken);
    }
    assert!(!cond.notify_one());

    for thread in &mut threads {
        thread.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), [1, 2, 3]);
}

/// A notification racing a timeout is reported exactly once, and only as
/// delivered when the notifier actually reached the waiter.
#[test]
fn test_timeout_race_is_consistent() {
    let kernel = common::kernel();
    for round in 0..200u64 {
        let mutex = Arc::new(Mutex::new_in(kernel, ()).unwrap());
        let cond = Arc::new(Condvar::new_in(kernel).unwrap());

        let (tx, rx) = std::sync::mpsc::channel();
        let waiter_mutex = Arc::clone(&mutex);
        let waiter_cond = Arc::clone(&cond);
        let mut waiter = Thread::builder()
            .spawn_in(kernel, move || {
                let guard = waiter_mutex.lock().unwrap();
                let (_guard, status) = waiter_cond
                    .wait_for(guard, Duration::from_millis(2))
                    .unwrap();
                tx.send(status).unwrap();
            })
            .unwrap();

        let jitter = 1_000 + common::Jitter::new(round).next_micros(2_000);
        std::thread::sleep(std::time::Duration::from_micros(jitter));
        let delivered = cond.notify_one();

        waiter.join().unwrap();
        let status = rx.recv().unwrap();
        assert_eq!(
            status == WaitStatus::NoTimeout,
            delivered,
            "round {round}: waiter saw {status:?}, notify_one returned {delivered}"
        );
        assert_eq!(cond.waiters().unwrap(), 0);
    }
}

#[test]
fn test_wait_for_returns_with_lock_held() {
    let kernel = common::kernel();
    let mutex = Mutex::new_in(kernel, 7).unwrap();
    let cond = Condvar::new_in(kernel).unwrap();

    let guard = mutex.lock().unwrap();
    let (guard, status) = cond.wait_for(guard, Duration::from_millis(5)).unwrap();
    assert_eq!(status, WaitStatus::Timeout);
    assert_eq!(*guard, 7);
    assert!(mutex.raw().is_held_by_current());
    assert_eq!(cond.waiters().unwrap(), 0);
    drop(guard);
    assert!(mutex.raw().owner().is_none());
}

#[test]
fn test_zero_timeout_polls() {
    let kernel = common::kernel();
    let mutex = Mutex::new_in(kernel, ()).unwrap();
    let cond = Condvar::new_in(kernel).unwrap();

    let started = std::time::Instant::now();
    let (_guard, status) = cond.wait_for(mutex.lock().unwrap(), Duration::ZERO).unwrap();
    assert_eq!(status, WaitStatus::Timeout);
    assert!(started.elapsed() < std::time::Duration::from_millis(50));
}

#[test]
fn test_negative_timeout_is_rejected() {
    let kernel = common::kernel();
    let mutex = Mutex::new_in(kernel, ()).unwrap();
    let cond = Condvar::new_in(kernel).unwrap();
    let guard = mutex.lock().unwrap();

    let before = kernel.calls();
    let err = cond.wait_for(guard, Duration::from_millis(-1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // The only kernel call is the release of the dropped guard.
    assert_eq!(kernel.calls() - before, 1);
    assert_eq!(cond.waiters().unwrap(), 0);
    assert!(mutex.raw().owner().is_none());
}

#[test]
fn test_wait_until_past_deadline_times_out_immediately() {
    let kernel = common::kernel();
    let mutex = Mutex::new_in(kernel, ()).unwrap();
    let cond = Condvar::new_in(kernel).unwrap();

    let past = SystemClock::now_in(kernel).unwrap() - Duration::from_millis(10);
    let (guard, status) = cond.wait_until(mutex.lock().unwrap(), past).unwrap();
    assert_eq!(status, WaitStatus::Timeout);
    assert_eq!(cond.waiters().unwrap(), 0);
    drop(guard);
}

#[test]
fn test_wait_timeout_while_reports_predicate() {
    let kernel = common::kernel();
    let state = Arc::new((Mutex::new_in(kernel, 0u32).unwrap(), Condvar::new_in(kernel).unwrap()));

    // Nobody changes the value: the condition still holds at the deadline.
    {
        let (mutex, cond) = &*state;
        let guard = mutex.lock().unwrap();
        let (_guard, status) = cond
            .wait_timeout_while(guard, Duration::from_millis(10), |value| *value < 3)
            .unwrap();
        assert_eq!(status, WaitStatus::Timeout);
    }

    let producer_state = Arc::clone(&state);
    let mut producer = Thread::builder()
        .spawn_in(kernel, move || {
            let (mutex, cond) = &*producer_state;
            for _ in 0..3 {
                std::thread::sleep(std::time::Duration::from_millis(2));
                *mutex.lock().unwrap() += 1;
                cond.notify_all();
            }
        })
        .unwrap();

    let (mutex, cond) = &*state;
    let guard = mutex.lock().unwrap();
    let (guard, status) = cond
        .wait_timeout_while(guard, Duration::from_secs(5), |value| *value < 3)
        .unwrap();
    assert_eq!(status, WaitStatus::NoTimeout);
    assert_eq!(*guard, 3);
    drop(guard);
    producer.join().unwrap();
}

#[test]
fn test_wait_until_while_reports_predicate() {
    let kernel = common::kernel();
    let state = Arc::new((Mutex::new_in(kernel, false).unwrap(), Condvar::new_in(kernel).unwrap()));

    // The deadline passes with the flag still clear.
    {
        let (mutex, cond) = &*state;
        let deadline = SystemClock::now_in(kernel).unwrap() + Duration::from_millis(10);
        let started = std::time::Instant::now();
        let (guard, status) = cond
            .wait_until_while(mutex.lock().unwrap(), deadline, |ready| !*ready)
            .unwrap();
        assert_eq!(status, WaitStatus::Timeout);
        assert!(!*guard);
        assert!(started.elapsed() >= std::time::Duration::from_millis(9));
        drop(guard);

        // A deadline already behind us returns at once.
        let past = SystemClock::now_in(kernel).unwrap() - Duration::from_secs(1);
        let (guard, status) = cond
            .wait_until_while(mutex.lock().unwrap(), past, |ready| !*ready)
            .unwrap();
        assert_eq!(status, WaitStatus::Timeout);
        drop(guard);
        assert_eq!(cond.waiters().unwrap(), 0);
    }

    let setter_state = Arc::clone(&state);
    let mut setter = Thread::builder()
        .spawn_in(kernel, move || {
            let (mutex, cond) = &*setter_state;
            std::thread::sleep(std::time::Duration::from_millis(5));
            *mutex.lock().unwrap() = true;
            cond.notify_all();
        })
        .unwrap();

    let (mutex, cond) = &*state;
    let deadline = SystemClock::now_in(kernel).unwrap() + Duration::from_secs(5);
    let (guard, status) = cond
        .wait_until_while(mutex.lock().unwrap(), deadline, |ready| !*ready)
        .unwrap();
    assert_eq!(status, WaitStatus::NoTimeout);
    assert!(*guard);
    drop(guard);
    setter.join().unwrap();
}

/// Bounded queue guarded by one mutex and two condition variables.
struct BoundedQueue {
    items: Mutex<VecDeque<u32>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl BoundedQueue {
    fn new(kernel: &'static HostKernel, capacity: usize) -> Self {
        Self {
            items: Mutex::new_in(kernel, VecDeque::new()).unwrap(),
            not_empty: Condvar::new_in(kernel).unwrap(),
            not_full: Condvar::new_in(kernel).unwrap(),
            capacity,
        }
    }

    fn push(&self, item: u32) {
        let guard = self.items.lock().unwrap();
        let mut guard = self
            .not_full
            .wait_while(guard, |items| items.len() >= self.capacity)
            .unwrap();
        guard.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    fn pop_for(&self, timeout: Duration) -> Option<u32> {
        let guard = self.items.lock().unwrap();
        let (mut guard, status) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap();
        if status.timed_out() {
            return None;
        }
        let item = guard.pop_front();
        drop(guard);
        self.not_full.notify_one();
        item
    }
}

#[test]
fn test_bounded_queue_delivers_in_order() {
    let kernel = common::kernel();
    let queue = Arc::new(BoundedQueue::new(kernel, 2));
    let received = Arc::new(Mutex::new_in(kernel, Vec::new()).unwrap());

    let consumer_queue = Arc::clone(&queue);
    let consumer_received = Arc::clone(&received);
    let mut consumer = Thread::builder()
        .name("consumer")
        .spawn_in(kernel, move || {
            for _ in 0..5 {
                let item = consumer_queue.pop_for(Duration::from_secs(5)).unwrap();
                consumer_received.lock().unwrap().push(item);
            }
        })
        .unwrap();

    common::eventually("consumer to block", || queue.not_empty.waiters().unwrap() == 1);
    queue.push(0);
    common::eventually("first item", || received.lock().unwrap().len() == 1);
    for item in 1..5 {
        queue.push(item);
    }

    consumer.join().unwrap();
    assert_eq!(*received.lock().unwrap(), [0, 1, 2, 3, 4]);
}

#[test]
fn test_bounded_queue_consumer_times_out_without_producer() {
    let kernel = common::kernel();
    let queue = BoundedQueue::new(kernel, 5);

    let started = std::time::Instant::now();
    assert_eq!(queue.pop_for(Duration::from_millis(100)), None);
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));
    assert!(queue.items.lock().unwrap().is_empty());
}
