use core::fmt;

/// Raw status returned by every kernel entry point.
///
/// This is the documented error category of the layer: it is the only way a
/// kernel code crosses into application code, attached to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelStatus {
    Ok,
    Error,
    ErrorTimeout,
    ErrorResource,
    ErrorParameter,
    ErrorNoMemory,
    ErrorIsr,
}

impl KernelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelStatus::Ok => "Operation completed successfully",
            KernelStatus::Error => {
                "Unspecified RTOS error: run-time error but no other error message fits"
            }
            KernelStatus::ErrorTimeout => "Operation not completed within the timeout period",
            KernelStatus::ErrorResource => "Resource not available",
            KernelStatus::ErrorParameter => "Parameter error",
            KernelStatus::ErrorNoMemory => "System is out of memory",
            KernelStatus::ErrorIsr => "Not allowed in ISR context",
        }
    }

    /// Human readable message for this status.
    pub fn message(self) -> &'static str {
        self.as_str()
    }

    pub fn is_ok(self) -> bool {
        self == KernelStatus::Ok
    }

    /// Classify a status that is neither success nor an expected timeout.
    pub fn kind(self) -> ErrorKind {
        match self {
            KernelStatus::ErrorParameter => ErrorKind::InvalidArgument,
            KernelStatus::ErrorResource | KernelStatus::ErrorNoMemory => {
                ErrorKind::ResourceExhausted
            }
            KernelStatus::ErrorIsr => ErrorKind::IllegalUsage,
            KernelStatus::Ok | KernelStatus::Error | KernelStatus::ErrorTimeout => {
                ErrorKind::KernelFault
            }
        }
    }
}

impl fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("kernel resource exhausted")]
    ResourceExhausted,
    #[error("illegal usage")]
    IllegalUsage,
    #[error("kernel fault")]
    KernelFault,
}

/// Numeric identity of the kernel object involved in a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Error raised by a primitive, carrying enough context to be diagnosed in
/// the field: the operation, the kernel object and the kernel status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{op}{}: {kind}{}{}", Handle(.handle), Reason(.reason), Status(.status))]
pub struct Error {
    kind: ErrorKind,
    op: &'static str,
    handle: Option<RawHandle>,
    status: Option<KernelStatus>,
    reason: Option<&'static str>,
}

struct Handle<'a>(&'a Option<RawHandle>);
struct Reason<'a>(&'a Option<&'static str>);
struct Status<'a>(&'a Option<KernelStatus>);

impl fmt::Display for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(handle) => write!(f, "({:#x})", handle.0),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Reason<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(reason) => write!(f, ", {reason}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Status<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(status) => write!(f, " ({status})"),
            None => Ok(()),
        }
    }
}

impl Error {
    pub const fn new(kind: ErrorKind, op: &'static str) -> Self {
        Self {
            kind,
            op,
            handle: None,
            status: None,
            reason: None,
        }
    }

    /// Error detected locally, before any kernel call was issued.
    pub const fn invalid_argument(op: &'static str, reason: &'static str) -> Self {
        Self::new(ErrorKind::InvalidArgument, op).with_reason(reason)
    }

    pub const fn illegal_usage(op: &'static str, reason: &'static str) -> Self {
        Self::new(ErrorKind::IllegalUsage, op).with_reason(reason)
    }

    /// Kernel refused to create an object.
    pub const fn exhausted(op: &'static str) -> Self {
        Self::new(ErrorKind::ResourceExhausted, op)
    }

    /// Translate a failed kernel status.
    pub fn from_status(
        op: &'static str,
        handle: impl Into<RawHandle>,
        status: KernelStatus,
    ) -> Self {
        Self {
            kind: status.kind(),
            op,
            handle: Some(handle.into()),
            status: Some(status),
            reason: None,
        }
    }

    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_handle(mut self, handle: impl Into<RawHandle>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub const fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Name of the failing operation.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn handle(&self) -> Option<RawHandle> {
        self.handle
    }

    /// Kernel status behind this error, if the kernel reported it.
    pub fn status(&self) -> Option<KernelStatus> {
        self.status
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.reason
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Outcome of a timed wait. A timeout is a normal result, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    NoTimeout,
    Timeout,
}

impl WaitStatus {
    pub fn timed_out(self) -> bool {
        self == WaitStatus::Timeout
    }
}

/// Route a programmer error through the configured misuse policy.
///
/// With `abort-on-misuse` the process stops here; otherwise the error is
/// handed back for propagation.
pub(crate) fn misuse(err: Error) -> Error {
    debug_assert_eq!(err.kind(), ErrorKind::IllegalUsage);
    if cfg!(feature = "abort-on-misuse") {
        fatal(err)
    }
    log::warn!("{err}");
    err
}

/// Translate a failed kernel status, applying the misuse policy to statuses
/// that denote programmer error.
pub(crate) fn kernel_error(
    op: &'static str,
    handle: impl Into<RawHandle>,
    status: KernelStatus,
) -> Error {
    let err = Error::from_status(op, handle, status);
    if err.kind() == ErrorKind::IllegalUsage {
        misuse(err)
    } else {
        err
    }
}

/// Map the status of a kernel wait. `ErrorResource` on a poll and
/// `ErrorTimeout` on a finite wait are timeouts, not errors.
pub(crate) fn wait_status(
    op: &'static str,
    handle: impl Into<RawHandle>,
    status: KernelStatus,
    ticks: crate::kernel::Ticks,
) -> Result<WaitStatus> {
    use crate::kernel::{NO_WAIT, WAIT_FOREVER};

    match status {
        KernelStatus::Ok => Ok(WaitStatus::NoTimeout),
        KernelStatus::ErrorTimeout if ticks != WAIT_FOREVER => Ok(WaitStatus::Timeout),
        KernelStatus::ErrorResource if ticks == NO_WAIT => Ok(WaitStatus::Timeout),
        status => Err(kernel_error(op, handle, status)),
    }
}

/// Report an error that cannot be propagated and stop.
#[cold]
pub(crate) fn fatal(err: Error) -> ! {
    crate::os::report_error(&err);
    log::error!("fatal: {err}");
    #[cfg(all(feature = "std", feature = "abort-on-misuse"))]
    {
        extern crate std;
        std::process::abort()
    }
    #[cfg(not(all(feature = "std", feature = "abort-on-misuse")))]
    panic!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn status_classification() {
        assert_eq!(KernelStatus::ErrorParameter.kind(), ErrorKind::InvalidArgument);
        assert_eq!(KernelStatus::ErrorResource.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(KernelStatus::ErrorNoMemory.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(KernelStatus::ErrorIsr.kind(), ErrorKind::IllegalUsage);
        assert_eq!(KernelStatus::Error.kind(), ErrorKind::KernelFault);
    }

    #[test]
    fn display_carries_context() {
        let err = Error::from_status(
            "Semaphore::release",
            RawHandle(0x2a),
            KernelStatus::ErrorResource,
        );
        let text = err.to_string();
        assert!(text.starts_with("Semaphore::release(0x2a)"));
        assert!(text.contains("Resource not available"));

        let err = Error::invalid_argument("Condvar::wait_for", "negative timeout");
        assert_eq!(
            err.to_string(),
            "Condvar::wait_for: invalid argument, negative timeout"
        );
        assert_eq!(err.status(), None);
    }
}
