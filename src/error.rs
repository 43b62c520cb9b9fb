//! Kernel-internal error taxonomy.
//!
//! Every fallible kernel operation returns a `KernelError` rather than a
//! string literal or a bare negative integer, mirroring the syscall ABI's
//! small negative error codes (spec §7) in a type-safe form. `as_errno`
//! converts to the value placed in a syscall's `eax` on failure.

use core::fmt;

/// Top-level kernel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Generic failure with no more specific cause.
    Fail,
    /// A syscall argument was malformed or out of range.
    Args,
    /// A size argument was unreasonable (too large, zero where disallowed).
    Len,
    /// A user buffer was not fully readable/writable.
    Buf,
    /// An unknown tid/pid/executable name was referenced.
    Name,
    /// Operation requires a single-threaded task (`exec`).
    MulThr,
    /// `wait` found no available child.
    Child,
    /// Kernel virtual memory is exhausted.
    NoVm,
    /// Physical frames are exhausted.
    NoMem,
    /// Target thread is not in the scheduler state the operation requires.
    State,
}

impl KernelError {
    /// Negative small-integer code placed in `eax` on syscall failure.
    pub const fn as_errno(self) -> i32 {
        match self {
            KernelError::Fail => -1,
            KernelError::Args => -2,
            KernelError::Len => -3,
            KernelError::Buf => -4,
            KernelError::Name => -5,
            KernelError::MulThr => -6,
            KernelError::Child => -7,
            KernelError::NoVm => -8,
            KernelError::NoMem => -9,
            KernelError::State => -10,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelError::Fail => "generic failure",
            KernelError::Args => "malformed or out-of-range argument",
            KernelError::Len => "unreasonable size argument",
            KernelError::Buf => "user buffer unreadable or unwritable",
            KernelError::Name => "unknown tid, pid, or executable name",
            KernelError::MulThr => "operation requires a single-threaded task",
            KernelError::Child => "no child available to wait for",
            KernelError::NoVm => "kernel virtual memory exhausted",
            KernelError::NoMem => "physical frames exhausted",
            KernelError::State => "thread not in required scheduler state",
        };
        f.write_str(s)
    }
}

/// Exit status a task is given when a fault kills it with no installed
/// software-exception handler (spec §7 "User-visible failure").
pub const FAULT_EXIT_STATUS: i32 = -2;

pub type Result<T> = core::result::Result<T, KernelError>;
