//! Bounded kernel message queues.
//!
//! The kernel copies fixed-size messages. How an element becomes a message
//! is chosen by a [`Transfer`] policy: [`ByValue`] copies the bytes of a
//! `Copy` element, [`Owned`] sends the pointer of a `Box` and hands the
//! allocation over to the receiver.

use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{size_of, MaybeUninit};

use crate::error::{fatal, wait_status, Error, Result, WaitStatus};
use crate::kernel::{Kernel, QueueId, Ticks, NO_WAIT, WAIT_FOREVER};
use crate::time::{ticks, Duration, Instant};

/// Encoding of queue elements into kernel messages.
///
/// # Safety
///
/// `decode` must accept exactly the values `encode` produces, each at most
/// once.
pub unsafe trait Transfer<T> {
    /// Message copied through the kernel.
    type Wire: Copy;

    fn encode(item: T) -> Self::Wire;

    /// # Safety
    ///
    /// `wire` must come from `encode` and must not be decoded twice.
    unsafe fn decode(wire: Self::Wire) -> T;
}

/// Copy the element itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByValue;

unsafe impl<T: Copy> Transfer<T> for ByValue {
    type Wire = T;

    fn encode(item: T) -> T {
        item
    }

    unsafe fn decode(wire: T) -> T {
        wire
    }
}

/// Transfer ownership of a boxed element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Owned;

unsafe impl<T> Transfer<Box<T>> for Owned {
    type Wire = usize;

    fn encode(item: Box<T>) -> usize {
        Box::into_raw(item) as usize
    }

    unsafe fn decode(wire: usize) -> Box<T> {
        unsafe { Box::from_raw(wire as *mut T) }
    }
}

/// Bounded FIFO of `T`, moved through the kernel with policy `P`.
pub struct MessageQueue<T, P: Transfer<T> = ByValue> {
    kernel: &'static dyn Kernel,
    id: QueueId,
    _marker: PhantomData<(fn(T) -> T, P)>,
}

unsafe impl<T: Send, P: Transfer<T>> Send for MessageQueue<T, P> {}
unsafe impl<T: Send, P: Transfer<T>> Sync for MessageQueue<T, P> {}

impl<T, P: Transfer<T>> MessageQueue<T, P> {
    pub fn new(capacity: usize) -> Result<Self> {
        Self::new_in(crate::os::kernel()?, capacity)
    }

    pub fn new_in(kernel: &'static dyn Kernel, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_argument("MessageQueue::new", "zero capacity"));
        }
        let id = kernel
            .queue_new(capacity, size_of::<P::Wire>())
            .ok_or(Error::exhausted("MessageQueue::new"))?;
        log::trace!("queue {:#x} created ({capacity} x {} bytes)", id.get(), size_of::<P::Wire>());
        Ok(Self {
            kernel,
            id,
            _marker: PhantomData,
        })
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.kernel.queue_len(self.id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.kernel.queue_capacity(self.id)
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Append `item`, blocking while the queue is full.
    pub fn send(&self, item: T) -> Result<()> {
        self.send_ticks("MessageQueue::send", item, WAIT_FOREVER)
            .map(|_| ())
    }

    /// Append without blocking; the item comes back if the queue is full.
    pub fn try_send(&self, item: T) -> Result<Option<T>> {
        self.send_ticks("MessageQueue::try_send", item, NO_WAIT)
    }

    pub fn try_send_for(&self, item: T, timeout: Duration) -> Result<Option<T>> {
        const OP: &str = "MessageQueue::try_send_for";
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.send_ticks(OP, item, ticks)
    }

    pub fn try_send_until(&self, item: T, deadline: Instant) -> Result<Option<T>> {
        const OP: &str = "MessageQueue::try_send_until";
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.send_ticks(OP, item, ticks)
    }

    /// Remove the oldest element, blocking while the queue is empty.
    pub fn receive(&self) -> Result<T> {
        match self.receive_ticks("MessageQueue::receive", WAIT_FOREVER)? {
            Some(item) => Ok(item),
            None => Err(Error::new(crate::error::ErrorKind::KernelFault, "MessageQueue::receive")
                .with_handle(self.id)),
        }
    }

    pub fn try_receive(&self) -> Result<Option<T>> {
        self.receive_ticks("MessageQueue::try_receive", NO_WAIT)
    }

    pub fn try_receive_for(&self, timeout: Duration) -> Result<Option<T>> {
        const OP: &str = "MessageQueue::try_receive_for";
        let ticks = ticks::timeout_ticks(self.kernel, OP, timeout)?;
        self.receive_ticks(OP, ticks)
    }

    pub fn try_receive_until(&self, deadline: Instant) -> Result<Option<T>> {
        const OP: &str = "MessageQueue::try_receive_until";
        let remaining = ticks::until(self.kernel, deadline)?;
        let ticks = ticks::timeout_ticks(self.kernel, OP, remaining)?;
        self.receive_ticks(OP, ticks)
    }

    fn send_ticks(&self, op: &'static str, item: T, ticks: Ticks) -> Result<Option<T>> {
        let wire = P::encode(item);
        // Viewed as `MaybeUninit` bytes so padding in `P::Wire` is never read
        // as initialized memory.
        let bytes = unsafe {
            core::slice::from_raw_parts(
                &wire as *const P::Wire as *const MaybeUninit<u8>,
                size_of::<P::Wire>(),
            )
        };
        let status = self.kernel.queue_put(self.id, bytes, ticks);
        match wait_status(op, self.id, status, ticks) {
            Ok(WaitStatus::NoTimeout) => Ok(None),
            // Not queued: the message is still ours to decode.
            Ok(WaitStatus::Timeout) => Ok(Some(unsafe { P::decode(wire) })),
            Err(err) => {
                drop(unsafe { P::decode(wire) });
                Err(err)
            }
        }
    }

    fn receive_ticks(&self, op: &'static str, ticks: Ticks) -> Result<Option<T>> {
        let mut wire = MaybeUninit::<P::Wire>::uninit();
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(
                wire.as_mut_ptr() as *mut MaybeUninit<u8>,
                size_of::<P::Wire>(),
            )
        };
        let status = self.kernel.queue_get(self.id, bytes, ticks);
        match wait_status(op, self.id, status, ticks)? {
            WaitStatus::NoTimeout => Ok(Some(unsafe { P::decode(wire.assume_init()) })),
            WaitStatus::Timeout => Ok(None),
        }
    }
}

impl<T, P: Transfer<T>> Drop for MessageQueue<T, P> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<T>() {
            while let Ok(Some(item)) = self.receive_ticks("MessageQueue::drop", NO_WAIT) {
                drop(item);
            }
        }
        let status = self.kernel.queue_delete(self.id);
        if !status.is_ok() {
            fatal(Error::from_status("MessageQueue::drop", self.id, status));
        }
        log::trace!("queue {:#x} deleted", self.id.get());
    }
}

impl<T, P: Transfer<T>> fmt::Debug for MessageQueue<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_round_trip_keeps_allocation() {
        let item = Box::new([7u8; 32]);
        let address = &*item as *const [u8; 32] as usize;
        let wire = <Owned as Transfer<Box<[u8; 32]>>>::encode(item);
        assert_eq!(wire, address);
        let back: Box<[u8; 32]> = unsafe { <Owned as Transfer<_>>::decode(wire) };
        assert_eq!(*back, [7u8; 32]);
    }
}
