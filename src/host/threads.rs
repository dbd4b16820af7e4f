//! Kernel threads of the hosted kernel, each backed by a `std` thread.

use std::string::ToString;
use std::sync::Arc;

use super::objects::{Body, ThreadObj};
use super::Inner;
use crate::error::KernelStatus;
use crate::kernel::{Priority, ThreadAttr, ThreadEntry, ThreadState, Ticks, NO_WAIT, WAIT_FOREVER};

// Target stacks are sized for the target; the host needs more.
const MIN_HOST_STACK: usize = 64 * 1024;

pub(super) fn adopted() -> Body {
    Body::Thread(ThreadObj {
        name: None,
        priority: Priority::NORMAL,
        stack_size: 0,
        state: ThreadState::Running,
        flags: 0,
        detached: true,
        join: None,
    })
}

/// Marks the thread terminated when its entry returns or unwinds.
struct Exit {
    inner: Arc<Inner>,
    id: usize,
}

impl Drop for Exit {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let detached = match state.thread(self.id) {
            Ok(thread) => {
                thread.state = ThreadState::Terminated;
                thread.detached
            }
            Err(_) => return,
        };
        if detached {
            state.remove(self.id);
        } else {
            state.wake(self.id);
        }
        log::debug!("host kernel {}: thread {:#x} exited", self.inner.instance, self.id);
    }
}

pub(super) fn spawn(inner: &Arc<Inner>, entry: ThreadEntry, attr: &ThreadAttr) -> Option<usize> {
    // Held until the join handle is stored, so the new thread cannot exit
    // before its handle is recorded.
    let mut state = inner.state.lock();
    let id = state.insert(Body::Thread(ThreadObj {
        name: attr.name,
        priority: attr.priority,
        stack_size: attr.stack_size,
        state: ThreadState::Ready,
        flags: 0,
        detached: false,
        join: None,
    }))?;

    let mut builder = std::thread::Builder::new();
    if let Some(name) = attr.name {
        builder = builder.name(name.to_string());
    }
    if attr.stack_size > 0 {
        builder = builder.stack_size(attr.stack_size.max(MIN_HOST_STACK));
    }

    let thread_inner = Arc::clone(inner);
    let spawned = builder.spawn(move || {
        thread_inner.register(id);
        thread_inner.state.lock().set_thread_state(id, ThreadState::Running);
        let _exit = Exit {
            inner: thread_inner,
            id,
        };
        entry();
    });

    match spawned {
        Ok(join) => {
            if let Ok(thread) = state.thread(id) {
                thread.join = Some(join);
            }
            log::debug!("host kernel {}: thread {id:#x} started", inner.instance);
            Some(id)
        }
        Err(err) => {
            log::warn!("host kernel {}: thread spawn failed: {err}", inner.instance);
            state.remove(id);
            None
        }
    }
}

pub(super) fn join(inner: &Inner, id: usize) -> Result<(), KernelStatus> {
    let me = inner.current();
    if me == id {
        return Err(KernelStatus::ErrorResource);
    }
    let join = inner.block(id, Some(me), WAIT_FOREVER, |state| {
        let thread = state.thread(id)?;
        if thread.detached {
            return Err(KernelStatus::ErrorResource);
        }
        Ok((thread.state == ThreadState::Terminated).then(|| thread.join.take()))
    })?;
    inner.state.lock().remove(id);

    match join.map(|join| join.join()) {
        Some(Err(_)) => Err(KernelStatus::Error),
        _ => Ok(()),
    }
}

pub(super) fn detach(inner: &Inner, id: usize) -> Result<(), KernelStatus> {
    let mut state = inner.state.lock();
    let thread = state.thread(id)?;
    if thread.detached {
        return Err(KernelStatus::ErrorResource);
    }
    if thread.state == ThreadState::Terminated {
        state.remove(id);
    } else {
        thread.detached = true;
        thread.join = None;
    }
    Ok(())
}

pub(super) fn delay(inner: &Inner, ticks: Ticks) {
    if ticks == NO_WAIT {
        std::thread::yield_now();
        return;
    }
    let me = inner.current();
    inner.state.lock().set_thread_state(me, ThreadState::Blocked);
    if ticks == WAIT_FOREVER {
        loop {
            std::thread::park();
        }
    }
    std::thread::sleep(inner.ticks_to_std(ticks));
    inner.state.lock().set_thread_state(me, ThreadState::Running);
}
