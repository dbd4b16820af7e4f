//! Software timers.
//!
//! The callback returns whether the timer should keep running; returning
//! `false` stops it before its next period. Callbacks run on the kernel
//! timer service and may start or stop their own timer through the
//! [`TimerControl`] they are given.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use portable_atomic::{AtomicBool, Ordering};
use spin::{Mutex, Once};

use crate::error::{fatal, kernel_error, Error, ErrorKind, KernelStatus, Result};
use crate::kernel::{Kernel, Ticks, TimerId, TimerKind};
use crate::time::{ticks, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire once per start.
    Once,
    /// Fire every period until stopped.
    Periodic,
}

impl From<TimerMode> for TimerKind {
    fn from(mode: TimerMode) -> Self {
        match mode {
            TimerMode::Once => TimerKind::Once,
            TimerMode::Periodic => TimerKind::Periodic,
        }
    }
}

type Callback = Box<dyn FnMut(&TimerControl) -> bool + Send + 'static>;

struct Shared {
    kernel: &'static dyn Kernel,
    id: Once<TimerId>,
    mode: TimerMode,
    period: Ticks,
    armed: AtomicBool,
    callback: Mutex<Callback>,
}

impl Shared {
    fn id(&self) -> Result<TimerId> {
        self.id
            .get()
            .copied()
            .ok_or(Error::new(ErrorKind::KernelFault, "Timer").with_reason("timer not created"))
    }

    fn fire(self: &Arc<Self>) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }
        if self.mode == TimerMode::Once {
            self.armed.store(false, Ordering::Release);
        }
        let control = TimerControl {
            shared: Arc::clone(self),
        };
        let keep_running = {
            let mut callback = self.callback.lock();
            (*callback)(&control)
        };
        if !keep_running {
            if let Err(err) = control.stop() {
                log::warn!("timer callback could not stop its timer: {err}");
            }
        }
    }
}

/// Handle for starting and stopping a timer, usable from its callback.
#[derive(Clone)]
pub struct TimerControl {
    shared: Arc<Shared>,
}

impl TimerControl {
    /// Arm the timer for its period; restarts a running timer.
    pub fn start(&self) -> Result<()> {
        let id = self.shared.id()?;
        self.shared.armed.store(true, Ordering::Release);
        let status = self.shared.kernel.timer_start(id, self.shared.period);
        if status.is_ok() {
            Ok(())
        } else {
            self.shared.armed.store(false, Ordering::Release);
            Err(kernel_error("Timer::start", id, status))
        }
    }

    /// Disarm the timer. Stopping a stopped timer does nothing.
    pub fn stop(&self) -> Result<()> {
        let id = self.shared.id()?;
        self.shared.armed.store(false, Ordering::Release);
        match self.shared.kernel.timer_stop(id) {
            KernelStatus::Ok | KernelStatus::ErrorResource => Ok(()),
            status => Err(kernel_error("Timer::stop", id, status)),
        }
    }

    pub fn is_running(&self) -> bool {
        match self.shared.id() {
            Ok(id) => {
                self.shared.armed.load(Ordering::Acquire) && self.shared.kernel.timer_is_running(id)
            }
            Err(_) => false,
        }
    }
}

impl fmt::Debug for TimerControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerControl")
            .field("id", &self.shared.id.get())
            .field("mode", &self.shared.mode)
            .finish()
    }
}

/// Kernel software timer owning its callback.
pub struct Timer {
    control: TimerControl,
}

impl Timer {
    /// Create a stopped timer. `period` must be positive.
    pub fn new<F>(period: Duration, mode: TimerMode, mut callback: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self::with_control_in(crate::os::kernel()?, period, mode, move |_| callback())
    }

    pub fn new_in<F>(
        kernel: &'static dyn Kernel,
        period: Duration,
        mode: TimerMode,
        mut callback: F,
    ) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self::with_control_in(kernel, period, mode, move |_| callback())
    }

    /// Like [`Timer::new`], handing the callback a [`TimerControl`].
    pub fn with_control<F>(period: Duration, mode: TimerMode, callback: F) -> Result<Self>
    where
        F: FnMut(&TimerControl) -> bool + Send + 'static,
    {
        Self::with_control_in(crate::os::kernel()?, period, mode, callback)
    }

    pub fn with_control_in<F>(
        kernel: &'static dyn Kernel,
        period: Duration,
        mode: TimerMode,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(&TimerControl) -> bool + Send + 'static,
    {
        const OP: &str = "Timer::new";
        if period.is_negative() || period.is_zero() {
            return Err(Error::invalid_argument(OP, "period must be positive"));
        }
        // Shorter than a tick still fires every tick.
        let period = ticks::timeout_ticks(kernel, OP, period)?.max(1);

        let shared = Arc::new(Shared {
            kernel,
            id: Once::new(),
            mode,
            period,
            armed: AtomicBool::new(false),
            callback: Mutex::new(Box::new(callback)),
        });
        let fire = Arc::clone(&shared);
        let id = kernel
            .timer_new(Arc::new(move || fire.fire()), mode.into())
            .ok_or(Error::exhausted(OP))?;
        shared.id.call_once(|| id);
        log::trace!("timer {:#x} created ({mode:?}, {period} ticks)", id.get());

        Ok(Self {
            control: TimerControl { shared },
        })
    }

    pub fn start(&self) -> Result<()> {
        self.control.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.control.stop()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn mode(&self) -> TimerMode {
        self.control.shared.mode
    }

    /// Period in kernel ticks.
    pub fn period_ticks(&self) -> Ticks {
        self.control.shared.period
    }

    pub fn control(&self) -> TimerControl {
        self.control.clone()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let shared = &self.control.shared;
        shared.armed.store(false, Ordering::Release);
        if let Some(&id) = shared.id.get() {
            let status = shared.kernel.timer_delete(id);
            if !status.is_ok() {
                fatal(Error::from_status("Timer::drop", id, status));
            }
            log::trace!("timer {:#x} deleted", id.get());
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("control", &self.control).finish()
    }
}
