//! Object table of the hosted kernel.

use core::mem::MaybeUninit;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::vec::Vec;

use parking_lot::Condvar;

use crate::error::KernelStatus;
use crate::kernel::{KernelState, Priority, ThreadState, TimerCallback, TimerKind};

pub(super) struct SemaphoreObj {
    pub count: u32,
    pub max: u32,
}

pub(super) struct MutexObj {
    pub recursive: bool,
    pub owner: Option<usize>,
    pub depth: u32,
}

pub(super) struct FlagsObj {
    pub flags: u32,
}

pub(super) struct ThreadObj {
    pub name: Option<&'static str>,
    pub priority: Priority,
    pub stack_size: usize,
    pub state: ThreadState,
    pub flags: u32,
    /// Set for foreign threads registered on first use, so they are never
    /// joinable.
    pub detached: bool,
    pub join: Option<JoinHandle<()>>,
}

pub(super) struct TimerObj {
    pub callback: TimerCallback,
    pub kind: TimerKind,
    pub running: bool,
    pub period: std::time::Duration,
    pub next: std::time::Instant,
}

pub(super) struct QueueObj {
    pub capacity: usize,
    pub msg_size: usize,
    pub items: VecDeque<Vec<MaybeUninit<u8>>>,
}

pub(super) enum Body {
    Semaphore(SemaphoreObj),
    Mutex(MutexObj),
    EventFlags(FlagsObj),
    Thread(ThreadObj),
    Timer(TimerObj),
    Queue(QueueObj),
}

/// A kernel object and the wait queue of threads blocked on it.
pub(super) struct Object {
    pub body: Body,
    pub waiters: Arc<Condvar>,
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&mut self, id: usize) -> Result<&mut $ty, KernelStatus> {
            match self.objects.get_mut(&id) {
                Some(Object {
                    body: Body::$variant(obj),
                    ..
                }) => Ok(obj),
                _ => Err(KernelStatus::ErrorParameter),
            }
        }
    };
}

pub(super) struct State {
    pub kernel_state: KernelState,
    pub dispatch_locked: bool,
    next_id: usize,
    limit: usize,
    objects: HashMap<usize, Object>,
}

impl State {
    pub fn new(limit: usize) -> Self {
        Self {
            kernel_state: KernelState::Inactive,
            dispatch_locked: false,
            next_id: 1,
            limit,
            objects: HashMap::new(),
        }
    }

    /// Register a new object, or `None` at the object limit.
    pub fn insert(&mut self, body: Body) -> Option<usize> {
        if self.objects.len() >= self.limit {
            return None;
        }
        Some(self.insert_unchecked(body))
    }

    /// Register an object regardless of the limit.
    pub fn insert_unchecked(&mut self, body: Body) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(
            id,
            Object {
                body,
                waiters: Arc::new(Condvar::new()),
            },
        );
        id
    }

    /// Remove an object and wake everything blocked on it.
    pub fn remove(&mut self, id: usize) -> Option<Body> {
        let object = self.objects.remove(&id)?;
        object.waiters.notify_all();
        Some(object.body)
    }

    pub fn waiters(&self, id: usize) -> Result<Arc<Condvar>, KernelStatus> {
        self.objects
            .get(&id)
            .map(|object| Arc::clone(&object.waiters))
            .ok_or(KernelStatus::ErrorParameter)
    }

    pub fn wake(&self, id: usize) {
        if let Some(object) = self.objects.get(&id) {
            object.waiters.notify_all();
        }
    }

    pub fn body(&self, id: usize) -> Option<&Body> {
        self.objects.get(&id).map(|object| &object.body)
    }

    pub fn threads(&self) -> impl Iterator<Item = (usize, &ThreadObj)> {
        self.objects.iter().filter_map(|(&id, object)| match &object.body {
            Body::Thread(thread) => Some((id, thread)),
            _ => None,
        })
    }

    pub fn timers_mut(&mut self) -> impl Iterator<Item = &mut TimerObj> {
        self.objects
            .values_mut()
            .filter_map(|object| match &mut object.body {
                Body::Timer(timer) => Some(timer),
                _ => None,
            })
    }

    accessor!(semaphore, Semaphore, SemaphoreObj);
    accessor!(mutex, Mutex, MutexObj);
    accessor!(event_flags, EventFlags, FlagsObj);
    accessor!(thread, Thread, ThreadObj);
    accessor!(timer, Timer, TimerObj);
    accessor!(queue, Queue, QueueObj);

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn event_flags_word(&mut self, id: usize) -> Result<&mut u32, KernelStatus> {
        self.event_flags(id).map(|obj| &mut obj.flags)
    }

    pub fn thread_flags_word(&mut self, id: usize) -> Result<&mut u32, KernelStatus> {
        self.thread(id).map(|obj| &mut obj.flags)
    }

    pub fn set_thread_state(&mut self, id: usize, state: ThreadState) {
        if let Ok(thread) = self.thread(id) {
            thread.state = state;
        }
    }
}

/// Outcome of a flag wait attempt: the flags before clearing, if the wait
/// condition is met.
pub(super) fn match_flags(flags: &mut u32, mask: u32, all: bool, no_clear: bool) -> Option<u32> {
    let matched = if all {
        *flags & mask == mask
    } else {
        *flags & mask != 0
    };
    if !matched {
        return None;
    }
    let observed = *flags;
    if !no_clear {
        *flags &= !mask;
    }
    Some(observed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_applies_to_insert_only() {
        let mut state = State::new(1);
        let a = state.insert(Body::EventFlags(FlagsObj { flags: 0 }));
        assert!(a.is_some());
        assert!(state.insert(Body::EventFlags(FlagsObj { flags: 0 })).is_none());
        let b = state.insert_unchecked(Body::EventFlags(FlagsObj { flags: 0 }));
        assert_ne!(a, Some(b));
    }

    #[test]
    fn wrong_kind_is_a_parameter_error() {
        let mut state = State::new(4);
        let id = state
            .insert(Body::Semaphore(SemaphoreObj { count: 0, max: 1 }))
            .unwrap();
        assert!(state.semaphore(id).is_ok());
        assert_eq!(state.mutex(id).err(), Some(KernelStatus::ErrorParameter));
        assert_eq!(state.queue(id + 1).err(), Some(KernelStatus::ErrorParameter));
    }

    #[test]
    fn flag_matching() {
        let mut flags = 0b0110;
        assert_eq!(match_flags(&mut flags, 0b0011, true, false), None);
        assert_eq!(match_flags(&mut flags, 0b0011, false, true), Some(0b0110));
        assert_eq!(flags, 0b0110);
        assert_eq!(match_flags(&mut flags, 0b0110, true, false), Some(0b0110));
        assert_eq!(flags, 0);
    }
}
