//! Hosted kernel: a simulated tick kernel running on `std` threads.
//!
//! Every object lives in one table behind a single kernel lock; each object
//! has its own wait queue so a wakeup only disturbs the threads blocked on
//! that object. Threads that were not created through the kernel (the test
//! harness, a `main` thread) are adopted the first time they call in.

mod objects;
mod threads;
mod timers;

use core::cell::{Cell, RefCell};
use core::mem::MaybeUninit;
use std::boxed::Box;
use std::sync::{Arc, Once};
use std::time::Instant;
use std::vec::Vec;

use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use self::objects::{match_flags, Body, FlagsObj, MutexObj, QueueObj, SemaphoreObj, State, TimerObj};
use crate::error::KernelStatus;
use crate::kernel::{
    EventFlagsId, FlagsWait, Kernel, KernelState, KernelVersion, MutexAttr, MutexId, Priority,
    QueueId, SemaphoreId, ThreadAttr, ThreadEntry, ThreadHandle, ThreadInfo, ThreadState, Ticks,
    TimerCallback, TimerId, TimerKind, FLAGS_MASK, NO_WAIT, WAIT_FOREVER,
};

/// Settings of a [`HostKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Kernel ticks per second.
    pub tick_frequency: u32,
    /// System timer counts per second.
    pub sys_timer_frequency: u32,
    /// Objects that may exist at once; creation fails beyond it.
    pub max_objects: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_frequency: 1000,
            sys_timer_frequency: 1_000_000,
            max_objects: 1024,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_frequency(mut self, hz: u32) -> Self {
        self.tick_frequency = hz;
        self
    }

    pub fn sys_timer_frequency(mut self, hz: u32) -> Self {
        self.sys_timer_frequency = hz;
        self
    }

    pub fn max_objects(mut self, max: usize) -> Self {
        self.max_objects = max;
        self
    }
}

static INSTANCES: AtomicUsize = AtomicUsize::new(0);

std::thread_local! {
    // (kernel instance, thread object) pairs of the running thread.
    static CURRENT: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
}

fn in_isr() -> bool {
    IN_ISR.with(Cell::get)
}

fn handle<T>(id: usize, wrap: fn(core::num::NonZeroUsize) -> T) -> Option<T> {
    core::num::NonZeroUsize::new(id).map(wrap)
}

fn status(result: Result<(), KernelStatus>) -> KernelStatus {
    match result {
        Ok(()) => KernelStatus::Ok,
        Err(status) => status,
    }
}

pub(crate) struct Inner {
    config: HostConfig,
    instance: usize,
    epoch: Instant,
    state: Mutex<State>,
    calls: AtomicU64,
    timer_wakeup: Condvar,
    timer_daemon: Once,
}

impl Inner {
    fn ticks_to_std(&self, ticks: Ticks) -> std::time::Duration {
        // Rounded up: a wait of n ticks lasts at least n ticks.
        let freq = u64::from(self.config.tick_frequency.max(1));
        let micros = (u64::from(ticks) * 1_000_000).div_ceil(freq);
        std::time::Duration::from_micros(micros)
    }

    fn deadline(&self, timeout: Ticks) -> Option<Instant> {
        if timeout == WAIT_FOREVER {
            return None;
        }
        Instant::now().checked_add(self.ticks_to_std(timeout))
    }

    fn registered(&self) -> Option<usize> {
        let instance = self.instance;
        CURRENT.with(|current| {
            current
                .borrow()
                .iter()
                .find(|(kernel, _)| *kernel == instance)
                .map(|&(_, id)| id)
        })
    }

    fn register(&self, id: usize) {
        CURRENT.with(|current| current.borrow_mut().push((self.instance, id)));
    }

    /// Thread object of the caller, adopting it if needed. Must not be
    /// called with the kernel lock held.
    fn current(&self) -> usize {
        if let Some(id) = self.registered() {
            return id;
        }
        let id = self.state.lock().insert_unchecked(threads::adopted());
        self.register(id);
        log::trace!("host kernel {}: adopted thread {id:#x}", self.instance);
        id
    }

    /// Run `attempt` until it yields a value, blocking on object `id`
    /// between attempts for at most `timeout` ticks.
    fn block<R>(
        &self,
        id: usize,
        me: Option<usize>,
        timeout: Ticks,
        mut attempt: impl FnMut(&mut State) -> Result<Option<R>, KernelStatus>,
    ) -> Result<R, KernelStatus> {
        let deadline = self.deadline(timeout);
        let mut state = self.state.lock();
        loop {
            if let Some(done) = attempt(&mut state)? {
                return Ok(done);
            }
            if timeout == NO_WAIT {
                return Err(KernelStatus::ErrorResource);
            }

            let waiters = state.waiters(id)?;
            if let Some(me) = me {
                state.set_thread_state(me, ThreadState::Blocked);
            }
            let timed_out = match deadline {
                Some(deadline) => waiters.wait_until(&mut state, deadline).timed_out(),
                None => {
                    waiters.wait(&mut state);
                    false
                }
            };
            if let Some(me) = me {
                state.set_thread_state(me, ThreadState::Running);
            }

            if timed_out {
                return attempt(&mut state)?.ok_or(KernelStatus::ErrorTimeout);
            }
        }
    }
}

/// Simulated kernel for hosted builds and tests.
///
/// Cloning yields another handle to the same kernel.
#[derive(Clone)]
pub struct HostKernel {
    inner: Arc<Inner>,
}

impl HostKernel {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        let instance = INSTANCES.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(Inner {
                config,
                instance,
                epoch: Instant::now(),
                state: Mutex::new(State::new(config.max_objects)),
                calls: AtomicU64::new(0),
                timer_wakeup: Condvar::new(),
                timer_daemon: Once::new(),
            }),
        }
    }

    /// Leak a started kernel, for use as `&'static dyn Kernel`.
    pub fn leak(self) -> &'static HostKernel {
        self.inner.state.lock().kernel_state = KernelState::Running;
        Box::leak(Box::new(self))
    }

    /// Default kernel installed by [`crate::os::kernel`] when none was.
    pub fn leak_default() -> &'static dyn Kernel {
        HostKernel::new().leak()
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Kernel entry points invoked so far.
    pub fn calls(&self) -> u64 {
        self.inner.calls.load(Ordering::Relaxed)
    }

    /// Live kernel objects, adopted threads included.
    pub fn objects(&self) -> usize {
        self.inner.state.lock().len()
    }

    /// Run `f` as if from an interrupt handler.
    pub fn interrupt<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = IN_ISR.with(|isr| isr.replace(true));
        let result = f();
        IN_ISR.with(|isr| isr.set(previous));
        result
    }

    fn enter(&self) {
        self.inner.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn create(&self, body: Body) -> Option<usize> {
        if in_isr() {
            return None;
        }
        let id = self.inner.state.lock().insert(body);
        if id.is_none() {
            log::warn!("host kernel {}: object limit reached", self.inner.instance);
        }
        id
    }

    fn delete(&self, id: usize, matches: fn(&Body) -> bool) -> KernelStatus {
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let mut state = self.inner.state.lock();
        match state.body(id) {
            Some(body) if matches(body) => {
                state.remove(id);
                KernelStatus::Ok
            }
            _ => KernelStatus::ErrorParameter,
        }
    }

    fn flags_wait(
        &self,
        id: usize,
        me: Option<usize>,
        mask: u32,
        options: FlagsWait,
        timeout: Ticks,
        flags_of: fn(&mut State, usize) -> Result<&mut u32, KernelStatus>,
    ) -> Result<u32, KernelStatus> {
        if mask == 0 || mask & !FLAGS_MASK != 0 {
            return Err(KernelStatus::ErrorParameter);
        }
        if in_isr() && timeout != NO_WAIT {
            return Err(KernelStatus::ErrorIsr);
        }
        self.inner.block(id, me, timeout, |state| {
            let flags = flags_of(state, id)?;
            Ok(match_flags(flags, mask, options.all, options.no_clear))
        })
    }
}

impl Default for HostKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostKernel")
            .field("instance", &self.inner.instance)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Kernel for HostKernel {
    fn tick_count(&self) -> u64 {
        self.enter();
        let micros = self.inner.epoch.elapsed().as_micros();
        let ticks = micros * u128::from(self.inner.config.tick_frequency) / 1_000_000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn tick_frequency(&self) -> u32 {
        self.enter();
        self.inner.config.tick_frequency
    }

    fn sys_timer_count(&self) -> u64 {
        self.enter();
        let nanos = self.inner.epoch.elapsed().as_nanos();
        let count = nanos * u128::from(self.inner.config.sys_timer_frequency) / 1_000_000_000;
        u64::try_from(count).unwrap_or(u64::MAX)
    }

    fn sys_timer_frequency(&self) -> u32 {
        self.enter();
        self.inner.config.sys_timer_frequency
    }

    fn version(&self) -> KernelVersion {
        self.enter();
        KernelVersion {
            api: 0x0002_0001,
            kernel: 0x0000_0300,
            id: "host-kernel",
        }
    }

    fn state(&self) -> KernelState {
        self.enter();
        let state = self.inner.state.lock();
        if state.dispatch_locked {
            KernelState::Locked
        } else {
            state.kernel_state
        }
    }

    fn initialize(&self) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let mut state = self.inner.state.lock();
        if state.kernel_state == KernelState::Inactive {
            state.kernel_state = KernelState::Ready;
        }
        KernelStatus::Ok
    }

    fn start(&self) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let mut state = self.inner.state.lock();
        match state.kernel_state {
            KernelState::Ready | KernelState::Running => {
                state.kernel_state = KernelState::Running;
                KernelStatus::Ok
            }
            _ => KernelStatus::Error,
        }
    }

    fn lock(&self) -> Result<bool, KernelStatus> {
        self.enter();
        if in_isr() {
            return Err(KernelStatus::ErrorIsr);
        }
        let mut state = self.inner.state.lock();
        Ok(core::mem::replace(&mut state.dispatch_locked, true))
    }

    fn restore_lock(&self, locked: bool) -> Result<bool, KernelStatus> {
        self.enter();
        if in_isr() {
            return Err(KernelStatus::ErrorIsr);
        }
        let mut state = self.inner.state.lock();
        Ok(core::mem::replace(&mut state.dispatch_locked, locked))
    }

    fn semaphore_new(&self, max: u32, initial: u32) -> Option<SemaphoreId> {
        self.enter();
        if max == 0 || initial > max {
            return None;
        }
        let id = self.create(Body::Semaphore(SemaphoreObj {
            count: initial,
            max,
        }))?;
        handle(id, SemaphoreId::new)
    }

    fn semaphore_delete(&self, id: SemaphoreId) -> KernelStatus {
        self.enter();
        self.delete(id.get(), |body| matches!(body, Body::Semaphore(_)))
    }

    fn semaphore_acquire(&self, id: SemaphoreId, timeout: Ticks) -> KernelStatus {
        self.enter();
        if in_isr() && timeout != NO_WAIT {
            return KernelStatus::ErrorIsr;
        }
        let me = self.inner.registered();
        status(self.inner.block(id.get(), me, timeout, |state| {
            let sem = state.semaphore(id.get())?;
            Ok((sem.count > 0).then(|| sem.count -= 1))
        }))
    }

    fn semaphore_release(&self, id: SemaphoreId) -> KernelStatus {
        self.enter();
        let mut state = self.inner.state.lock();
        let sem = match state.semaphore(id.get()) {
            Ok(sem) => sem,
            Err(status) => return status,
        };
        if sem.count >= sem.max {
            return KernelStatus::ErrorResource;
        }
        sem.count += 1;
        state.wake(id.get());
        KernelStatus::Ok
    }

    fn semaphore_count(&self, id: SemaphoreId) -> u32 {
        self.enter();
        self.inner
            .state
            .lock()
            .semaphore(id.get())
            .map_or(0, |sem| sem.count)
    }

    fn mutex_new(&self, attr: &MutexAttr) -> Option<MutexId> {
        self.enter();
        let id = self.create(Body::Mutex(MutexObj {
            recursive: attr.recursive,
            owner: None,
            depth: 0,
        }))?;
        handle(id, MutexId::new)
    }

    fn mutex_delete(&self, id: MutexId) -> KernelStatus {
        self.enter();
        self.delete(id.get(), |body| matches!(body, Body::Mutex(_)))
    }

    fn mutex_acquire(&self, id: MutexId, timeout: Ticks) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let me = self.inner.current();
        status(self.inner.block(id.get(), Some(me), timeout, |state| {
            let mutex = state.mutex(id.get())?;
            match mutex.owner {
                None => {
                    mutex.owner = Some(me);
                    mutex.depth = 1;
                    Ok(Some(()))
                }
                Some(owner) if owner == me => {
                    if !mutex.recursive {
                        return Err(KernelStatus::ErrorResource);
                    }
                    mutex.depth += 1;
                    Ok(Some(()))
                }
                Some(_) => Ok(None),
            }
        }))
    }

    fn mutex_release(&self, id: MutexId) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let me = self.inner.current();
        let mut state = self.inner.state.lock();
        let mutex = match state.mutex(id.get()) {
            Ok(mutex) => mutex,
            Err(status) => return status,
        };
        if mutex.owner != Some(me) {
            return KernelStatus::ErrorResource;
        }
        mutex.depth -= 1;
        if mutex.depth == 0 {
            mutex.owner = None;
            state.wake(id.get());
        }
        KernelStatus::Ok
    }

    fn mutex_owner(&self, id: MutexId) -> Option<ThreadHandle> {
        self.enter();
        let owner = self.inner.state.lock().mutex(id.get()).ok()?.owner?;
        handle(owner, ThreadHandle::new)
    }

    fn event_flags_new(&self) -> Option<EventFlagsId> {
        self.enter();
        let id = self.create(Body::EventFlags(FlagsObj { flags: 0 }))?;
        handle(id, EventFlagsId::new)
    }

    fn event_flags_delete(&self, id: EventFlagsId) -> KernelStatus {
        self.enter();
        self.delete(id.get(), |body| matches!(body, Body::EventFlags(_)))
    }

    fn event_flags_set(&self, id: EventFlagsId, mask: u32) -> Result<u32, KernelStatus> {
        self.enter();
        if mask & !FLAGS_MASK != 0 {
            return Err(KernelStatus::ErrorParameter);
        }
        let mut state = self.inner.state.lock();
        let obj = state.event_flags(id.get())?;
        obj.flags |= mask;
        let flags = obj.flags;
        state.wake(id.get());
        Ok(flags)
    }

    fn event_flags_clear(&self, id: EventFlagsId, mask: u32) -> Result<u32, KernelStatus> {
        self.enter();
        if mask & !FLAGS_MASK != 0 {
            return Err(KernelStatus::ErrorParameter);
        }
        let mut state = self.inner.state.lock();
        let obj = state.event_flags(id.get())?;
        let previous = obj.flags;
        obj.flags &= !mask;
        Ok(previous)
    }

    fn event_flags_get(&self, id: EventFlagsId) -> Result<u32, KernelStatus> {
        self.enter();
        Ok(self.inner.state.lock().event_flags(id.get())?.flags)
    }

    fn event_flags_wait(
        &self,
        id: EventFlagsId,
        mask: u32,
        options: FlagsWait,
        timeout: Ticks,
    ) -> Result<u32, KernelStatus> {
        self.enter();
        let me = self.inner.registered();
        self.flags_wait(id.get(), me, mask, options, timeout, State::event_flags_word)
    }

    fn thread_new(&self, entry: ThreadEntry, attr: &ThreadAttr) -> Option<ThreadHandle> {
        self.enter();
        if in_isr() {
            return None;
        }
        let id = threads::spawn(&self.inner, entry, attr)?;
        handle(id, ThreadHandle::new)
    }

    fn thread_current(&self) -> Option<ThreadHandle> {
        self.enter();
        if in_isr() {
            return None;
        }
        handle(self.inner.current(), ThreadHandle::new)
    }

    fn thread_join(&self, thread: ThreadHandle) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        status(threads::join(&self.inner, thread.get()))
    }

    fn thread_detach(&self, thread: ThreadHandle) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        status(threads::detach(&self.inner, thread.get()))
    }

    fn thread_yield(&self) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        std::thread::yield_now();
        KernelStatus::Ok
    }

    fn thread_delay(&self, ticks: Ticks) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        threads::delay(&self.inner, ticks);
        KernelStatus::Ok
    }

    fn thread_set_priority(&self, thread: ThreadHandle, priority: Priority) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        if priority < Priority::IDLE || priority > Priority::ISR {
            return KernelStatus::ErrorParameter;
        }
        let mut state = self.inner.state.lock();
        match state.thread(thread.get()) {
            Ok(obj) if obj.state != ThreadState::Terminated => {
                obj.priority = priority;
                KernelStatus::Ok
            }
            Ok(_) => KernelStatus::ErrorResource,
            Err(status) => status,
        }
    }

    fn thread_priority(&self, thread: ThreadHandle) -> Option<Priority> {
        self.enter();
        let mut state = self.inner.state.lock();
        state.thread(thread.get()).ok().map(|obj| obj.priority)
    }

    fn thread_count(&self) -> usize {
        self.enter();
        let state = self.inner.state.lock();
        state
            .threads()
            .filter(|(_, thread)| thread.state != ThreadState::Terminated)
            .count()
    }

    fn thread_enumerate(&self) -> Vec<ThreadHandle> {
        self.enter();
        let state = self.inner.state.lock();
        let mut ids: Vec<usize> = state
            .threads()
            .filter(|(_, thread)| thread.state != ThreadState::Terminated)
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| handle(id, ThreadHandle::new))
            .collect()
    }

    fn thread_info(&self, thread: ThreadHandle) -> Option<ThreadInfo> {
        self.enter();
        let mut state = self.inner.state.lock();
        let obj = state.thread(thread.get()).ok()?;
        Some(ThreadInfo {
            handle: thread,
            name: obj.name,
            state: obj.state,
            priority: obj.priority,
            stack_size: obj.stack_size,
        })
    }

    fn thread_flags_set(&self, thread: ThreadHandle, mask: u32) -> Result<u32, KernelStatus> {
        self.enter();
        if mask & !FLAGS_MASK != 0 {
            return Err(KernelStatus::ErrorParameter);
        }
        let mut state = self.inner.state.lock();
        let obj = state.thread(thread.get())?;
        if obj.state == ThreadState::Terminated {
            return Err(KernelStatus::ErrorResource);
        }
        obj.flags |= mask;
        let flags = obj.flags;
        state.wake(thread.get());
        Ok(flags)
    }

    fn thread_flags_get(&self) -> Result<u32, KernelStatus> {
        self.enter();
        if in_isr() {
            return Err(KernelStatus::ErrorIsr);
        }
        let me = self.inner.current();
        Ok(self.inner.state.lock().thread(me)?.flags)
    }

    fn thread_flags_clear(&self, mask: u32) -> Result<u32, KernelStatus> {
        self.enter();
        if in_isr() {
            return Err(KernelStatus::ErrorIsr);
        }
        if mask & !FLAGS_MASK != 0 {
            return Err(KernelStatus::ErrorParameter);
        }
        let me = self.inner.current();
        let mut state = self.inner.state.lock();
        let obj = state.thread(me)?;
        let previous = obj.flags;
        obj.flags &= !mask;
        Ok(previous)
    }

    fn thread_flags_wait(
        &self,
        mask: u32,
        options: FlagsWait,
        timeout: Ticks,
    ) -> Result<u32, KernelStatus> {
        self.enter();
        if in_isr() {
            return Err(KernelStatus::ErrorIsr);
        }
        let me = self.inner.current();
        self.flags_wait(me, Some(me), mask, options, timeout, State::thread_flags_word)
    }

    fn timer_new(&self, callback: TimerCallback, kind: TimerKind) -> Option<TimerId> {
        self.enter();
        let id = self.create(Body::Timer(TimerObj {
            callback,
            kind,
            running: false,
            period: std::time::Duration::ZERO,
            next: Instant::now(),
        }))?;
        handle(id, TimerId::new)
    }

    fn timer_delete(&self, id: TimerId) -> KernelStatus {
        self.enter();
        let status = self.delete(id.get(), |body| matches!(body, Body::Timer(_)));
        self.inner.timer_wakeup.notify_all();
        status
    }

    fn timer_start(&self, id: TimerId, ticks: Ticks) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        if ticks == NO_WAIT || ticks == WAIT_FOREVER {
            return KernelStatus::ErrorParameter;
        }
        let period = self.inner.ticks_to_std(ticks);
        {
            let mut state = self.inner.state.lock();
            let timer = match state.timer(id.get()) {
                Ok(timer) => timer,
                Err(status) => return status,
            };
            timer.running = true;
            timer.period = period;
            timer.next = Instant::now() + period;
        }
        timers::ensure_daemon(&self.inner);
        self.inner.timer_wakeup.notify_all();
        KernelStatus::Ok
    }

    fn timer_stop(&self, id: TimerId) -> KernelStatus {
        self.enter();
        if in_isr() {
            return KernelStatus::ErrorIsr;
        }
        let mut state = self.inner.state.lock();
        let timer = match state.timer(id.get()) {
            Ok(timer) => timer,
            Err(status) => return status,
        };
        if !timer.running {
            return KernelStatus::ErrorResource;
        }
        timer.running = false;
        self.inner.timer_wakeup.notify_all();
        KernelStatus::Ok
    }

    fn timer_is_running(&self, id: TimerId) -> bool {
        self.enter();
        self.inner
            .state
            .lock()
            .timer(id.get())
            .is_ok_and(|timer| timer.running)
    }

    fn queue_new(&self, capacity: usize, msg_size: usize) -> Option<QueueId> {
        self.enter();
        if capacity == 0 {
            return None;
        }
        let id = self.create(Body::Queue(QueueObj {
            capacity,
            msg_size,
            items: Default::default(),
        }))?;
        handle(id, QueueId::new)
    }

    fn queue_delete(&self, id: QueueId) -> KernelStatus {
        self.enter();
        self.delete(id.get(), |body| matches!(body, Body::Queue(_)))
    }

    fn queue_put(&self, id: QueueId, msg: &[MaybeUninit<u8>], timeout: Ticks) -> KernelStatus {
        self.enter();
        if in_isr() && timeout != NO_WAIT {
            return KernelStatus::ErrorIsr;
        }
        let me = self.inner.registered();
        status(self.inner.block(id.get(), me, timeout, |state| {
            let queue = state.queue(id.get())?;
            if msg.len() != queue.msg_size {
                return Err(KernelStatus::ErrorParameter);
            }
            if queue.items.len() >= queue.capacity {
                return Ok(None);
            }
            queue.items.push_back(msg.to_vec());
            state.wake(id.get());
            Ok(Some(()))
        }))
    }

    fn queue_get(
        &self,
        id: QueueId,
        msg: &mut [MaybeUninit<u8>],
        timeout: Ticks,
    ) -> KernelStatus {
        self.enter();
        if in_isr() && timeout != NO_WAIT {
            return KernelStatus::ErrorIsr;
        }
        let me = self.inner.registered();
        status(self.inner.block(id.get(), me, timeout, |state| {
            let queue = state.queue(id.get())?;
            if msg.len() != queue.msg_size {
                return Err(KernelStatus::ErrorParameter);
            }
            let Some(item) = queue.items.pop_front() else {
                return Ok(None);
            };
            msg.copy_from_slice(&item);
            state.wake(id.get());
            Ok(Some(()))
        }))
    }

    fn queue_len(&self, id: QueueId) -> usize {
        self.enter();
        self.inner
            .state
            .lock()
            .queue(id.get())
            .map_or(0, |queue| queue.items.len())
    }

    fn queue_capacity(&self, id: QueueId) -> usize {
        self.enter();
        self.inner
            .state
            .lock()
            .queue(id.get())
            .map_or(0, |queue| queue.capacity)
    }
}
