//! Process-wide kernel installation and kernel control.
//!
//! The kernel and the idle/error hooks are installed once, during an
//! initialization phase, and read for the rest of the process lifetime.

use crate::error::{misuse, Error, ErrorKind, Result};
use crate::kernel::{Kernel, KernelState, KernelVersion, KERNEL_HANDLE};
use spin::Once;

/// Hooks installed alongside the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsConfig {
    /// Run by the kernel whenever no thread is ready.
    pub idle_hook: Option<fn()>,
    /// Notified of every fatal error before the process stops.
    pub error_hook: Option<fn(&Error)>,
}

static KERNEL: Once<&'static dyn Kernel> = Once::new();
static CONFIG: Once<OsConfig> = Once::new();

/// Install the process-wide kernel and its hooks.
///
/// Must be called once, before any primitive is created with the default
/// constructors; a second call fails with [`ErrorKind::IllegalUsage`].
pub fn initialize(kernel: &'static dyn Kernel, config: OsConfig) -> Result<()> {
    let mut installed = false;
    KERNEL.call_once(|| {
        installed = true;
        kernel
    });
    if !installed {
        return Err(misuse(Error::illegal_usage(
            "os::initialize",
            "kernel already installed",
        )));
    }
    CONFIG.call_once(|| config);

    if kernel.state() == KernelState::Inactive {
        let status = kernel.initialize();
        if !status.is_ok() {
            return Err(Error::from_status("os::initialize", KERNEL_HANDLE, status));
        }
    }
    log::debug!("kernel installed: {}", kernel.version().id);
    Ok(())
}

/// The process-wide kernel.
///
/// With the `std` feature a default [`HostKernel`](crate::host::HostKernel)
/// is installed on first use if [`initialize`] was never called.
pub fn kernel() -> Result<&'static dyn Kernel> {
    #[cfg(feature = "std")]
    {
        Ok(*KERNEL.call_once(crate::host::HostKernel::leak_default))
    }
    #[cfg(not(feature = "std"))]
    {
        KERNEL.get().copied().ok_or_else(|| {
            Error::illegal_usage("os::kernel", "kernel not initialized")
        })
    }
}

pub fn config() -> OsConfig {
    CONFIG.get().copied().unwrap_or_default()
}

/// Run the idle hook, if one was configured.
pub fn run_idle_hook() {
    if let Some(hook) = config().idle_hook {
        hook();
    }
}

pub(crate) fn report_error(err: &Error) {
    if let Some(hook) = config().error_hook {
        hook(err);
    }
}

/// Kernel identification string.
pub fn version() -> Result<KernelVersion> {
    Ok(kernel()?.version())
}

/// Tick frequency of the kernel, in Hz.
pub fn tick_frequency() -> Result<u32> {
    crate::time::clock::tick_frequency(kernel()?)
}

/// Start the scheduler. On a real target this does not return on success.
pub fn start() -> Result<()> {
    let status = kernel()?.start();
    if status.is_ok() {
        Ok(())
    } else {
        Err(Error::from_status("os::start", KERNEL_HANDLE, status))
    }
}

/// Scheduler lock, released when dropped.
///
/// The previous lock state is restored, so guards nest.
pub struct DispatchLock {
    kernel: &'static dyn Kernel,
    previous: bool,
}

impl DispatchLock {
    pub fn new() -> Result<Self> {
        Self::new_in(kernel()?)
    }

    pub fn new_in(kernel: &'static dyn Kernel) -> Result<Self> {
        let previous = kernel
            .lock()
            .map_err(|status| Error::from_status("os::DispatchLock", KERNEL_HANDLE, status))?;
        Ok(Self { kernel, previous })
    }

    /// Whether the scheduler is currently locked.
    pub fn locked(kernel: &dyn Kernel) -> bool {
        kernel.state() == KernelState::Locked
    }
}

impl Drop for DispatchLock {
    fn drop(&mut self) {
        if let Err(status) = self.kernel.restore_lock(self.previous) {
            crate::error::fatal(
                Error::from_status("os::DispatchLock::drop", KERNEL_HANDLE, status)
                    .with_kind(ErrorKind::KernelFault),
            );
        }
    }
}
