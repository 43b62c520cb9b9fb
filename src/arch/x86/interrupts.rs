//! Interrupt enable/disable primitives underlying `sched::quick_lock`.
//!
//! Test builds exercise `sched`'s pure logic without ever running
//! `arch::init`, so there's no IDT installed to safely `sti` into; swap in a
//! software stand-in that tracks the same enabled/disabled state instead.

#[cfg(not(test))]
use core::arch::asm;

/// Disable maskable interrupts.
#[cfg(not(test))]
#[inline]
pub fn disable() {
    unsafe { asm!("cli", options(nomem, nostack)) }
}

/// Enable maskable interrupts.
#[cfg(not(test))]
#[inline]
pub fn enable() {
    unsafe { asm!("sti", options(nomem, nostack)) }
}

/// Whether interrupts are currently enabled, read from `eflags.IF`.
#[cfg(not(test))]
#[inline]
pub fn are_enabled() -> bool {
    let flags: u32;
    unsafe {
        asm!(
            "pushfd",
            "pop {0}",
            out(reg) flags,
            options(nomem, preserves_flags)
        );
    }
    flags & (1 << 9) != 0
}

#[cfg(test)]
mod host_stub {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub use host_stub::{are_enabled, disable, enable};
