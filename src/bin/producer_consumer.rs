//! Producers and consumers sharing a bounded buffer guarded by a mutex and
//! two condition variables, with a periodic timer reporting progress.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtos_sync::{
    os, this_thread, Condvar, Duration, Mutex, OsConfig, Result, Thread, Timer, TimerMode,
};

const PRODUCERS: u64 = 3;
const CONSUMERS: u64 = 2;
const ITEMS_PER_PRODUCER: u64 = 2_000;
const CAPACITY: usize = 8;

struct Buffer {
    items: Mutex<(VecDeque<u64>, bool)>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl Buffer {
    fn new() -> Result<Self> {
        Ok(Self {
            items: Mutex::new((VecDeque::with_capacity(CAPACITY), false))?,
            not_empty: Condvar::new()?,
            not_full: Condvar::new()?,
        })
    }

    fn push(&self, item: u64) -> Result<()> {
        let guard = self.items.lock()?;
        let mut guard = self
            .not_full
            .wait_while(guard, |(items, _)| items.len() >= CAPACITY)?;
        guard.0.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Next item, or `None` once the buffer is closed and drained.
    fn pop(&self) -> Result<Option<u64>> {
        let guard = self.items.lock()?;
        let mut guard = self
            .not_empty
            .wait_while(guard, |(items, closed)| items.is_empty() && !*closed)?;
        let item = guard.0.pop_front();
        drop(guard);
        if item.is_some() {
            self.not_full.notify_one();
        }
        Ok(item)
    }

    fn close(&self) -> Result<()> {
        self.items.lock()?.1 = true;
        self.not_empty.notify_all();
        Ok(())
    }
}

fn main() -> Result<()> {
    os::initialize(rtos_sync::host::HostKernel::leak_default(), OsConfig::default())?;
    os::start()?;
    println!("kernel: {} at {} Hz", os::version()?.id, os::tick_frequency()?);

    let buffer = Arc::new(Buffer::new()?);
    let consumed = Arc::new(AtomicU64::new(0));
    let checksum = Arc::new(AtomicU64::new(0));

    let progress = Arc::clone(&consumed);
    let reporter = Timer::new(Duration::from_millis(20), TimerMode::Periodic, move || {
        println!("consumed so far: {}", progress.load(Ordering::Relaxed));
        true
    })?;
    reporter.start()?;

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let buffer = Arc::clone(&buffer);
        producers.push(Thread::builder().name("producer").spawn(move || {
            for i in 0..ITEMS_PER_PRODUCER {
                if let Err(err) = buffer.push(p * ITEMS_PER_PRODUCER + i) {
                    eprintln!("producer {p}: {err}");
                    return;
                }
            }
        })?);
    }

    let mut consumers = Vec::new();
    for c in 0..CONSUMERS {
        let buffer = Arc::clone(&buffer);
        let consumed = Arc::clone(&consumed);
        let checksum = Arc::clone(&checksum);
        consumers.push(Thread::builder().name("consumer").spawn(move || loop {
            match buffer.pop() {
                Ok(Some(item)) => {
                    consumed.fetch_add(1, Ordering::Relaxed);
                    checksum.fetch_add(item, Ordering::Relaxed);
                }
                Ok(None) => break,
                Err(err) => {
                    eprintln!("consumer {c}: {err}");
                    break;
                }
            }
        })?);
    }

    for producer in &mut producers {
        producer.join()?;
    }
    buffer.close()?;
    for consumer in &mut consumers {
        consumer.join()?;
    }
    reporter.stop()?;
    this_thread::sleep_for(Duration::from_millis(1))?;

    let total = PRODUCERS * ITEMS_PER_PRODUCER;
    let expected: u64 = (0..total).sum();
    println!(
        "consumed {} of {total} items, checksum {}",
        consumed.load(Ordering::Relaxed),
        if checksum.load(Ordering::Relaxed) == expected { "ok" } else { "MISMATCH" }
    );
    Ok(())
}
