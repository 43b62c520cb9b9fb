//! Thread control block (spec §3 "TCB").
//!
//! A TCB lives at the base of its thread's one-page kernel stack, so
//! `align_down(esp, PAGE_SIZE)` recovers it from anywhere in kernel code
//! running on that stack (spec §9 "TCB by stack self-identification"). This
//! crate keeps that layout invariant available (`kstack_top`/`kstack_base`)
//! but, per spec §9's note that it is "useful ... but not essential", finds
//! the current TCB through a per-CPU pointer (`CURRENT`, in `sched`)
//! instead of pointer arithmetic on `esp`.

use alloc::sync::Arc;
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use spin::Mutex;

use crate::{
    config::PAGE_SIZE,
    ids::Tid,
    process::pcb::Pcb,
    sync::condvar::KCondvar,
};

pub const TCB_SANITY: u32 = 0x7443_4231; // "tCB1"

/// A registered software-exception handler (spec §4.10).
#[derive(Clone, Copy)]
pub struct SwexnHandler {
    pub esp3: u32,
    pub eip: u32,
    pub arg: u32,
}

pub struct Tcb {
    pub tid: Tid,
    pub pcb: Arc<Pcb>,

    /// Saved kernel stack pointer, read/written only by the scheduler's
    /// `next()` while this thread is not the one currently executing.
    ///
    /// # Safety invariant
    /// Exactly one of: (a) this thread is not `sched::current()`, in which
    /// case exactly the scheduler touches this cell while holding the
    /// scheduler's quick-lock, or (b) this thread *is* current, in which
    /// case the value is stale and must not be read until the next
    /// context switch writes it.
    saved_esp: UnsafeCell<u32>,

    /// Physical address of this thread's page directory (shared with every
    /// other thread in `pcb`). Atomic because `exec` replaces it for the
    /// currently running thread, which the scheduler may read concurrently
    /// from a timer interrupt on the same CPU.
    pub dir_phys: AtomicU32,

    /// Top of the one-page kernel stack this TCB lives at the base of.
    pub kstack_top: u32,
    pub kstack_base: u32,

    pub blocked: AtomicBool,
    pub descheduled: AtomicBool,

    /// Wake tick while sleeping; generation guards against a stale sleep
    /// heap entry outliving a cancelled sleep (spec: vanish removes
    /// pending sleepers from the heap).
    pub sleep_generation: AtomicU64,

    pub handler: Mutex<Option<SwexnHandler>>,
    pub swexn_stack_claimed: AtomicBool,
    pub swexn_signal: KCondvar,

    /// User entry eip/esp this thread drops into the first time it's
    /// scheduled, read once by `process::exec`'s trampoline and otherwise
    /// unused (a running thread's user context lives in its trap frame).
    pub initial_entry: AtomicU32,
    pub initial_user_esp: AtomicU32,

    /// Kernel stack address of a copied trap frame this thread should
    /// resume into instead of `initial_entry`/`initial_user_esp`, set by
    /// `fork`/`thread_fork` for a child that must continue exactly where
    /// its parent trapped in rather than dropping into a fresh entry point.
    /// Zero means "not a fork child, use initial_entry instead".
    pub resume_trap_frame: AtomicU32,

    pub sanity_constant: u32,
}

// SAFETY: `saved_esp` is only ever mutated under the scheduler's
// quick-lock, and only for a TCB that is not the currently running thread
// (see the field's doc comment).
unsafe impl Sync for Tcb {}

impl Tcb {
    pub fn new(tid: Tid, pcb: Arc<Pcb>, kstack_base: u32) -> Self {
        let kstack_top = kstack_base + PAGE_SIZE as u32;
        let dir_phys = pcb.dir_phys.load(Ordering::Acquire);
        Self {
            tid,
            pcb,
            saved_esp: UnsafeCell::new(kstack_top),
            dir_phys: AtomicU32::new(dir_phys),
            kstack_top,
            kstack_base,
            blocked: AtomicBool::new(false),
            descheduled: AtomicBool::new(false),
            sleep_generation: AtomicU64::new(0),
            handler: Mutex::new(None),
            swexn_stack_claimed: AtomicBool::new(false),
            swexn_signal: KCondvar::new(),
            initial_entry: AtomicU32::new(0),
            initial_user_esp: AtomicU32::new(0),
            resume_trap_frame: AtomicU32::new(0),
            sanity_constant: TCB_SANITY,
        }
    }

    /// # Safety
    /// Caller must hold the scheduler quick-lock and must not call this for
    /// the currently running thread.
    pub unsafe fn saved_esp_ptr(&self) -> *mut u32 {
        self.saved_esp.get()
    }

    /// Set the saved stack pointer for a thread that has never run yet.
    /// Used only by `process::exec`'s trampoline setup, before the thread
    /// is enqueued on the scheduler, so none of `saved_esp_ptr`'s ordering
    /// concerns apply: nothing else can be touching this cell yet.
    pub fn set_initial_esp(&self, esp: u32) {
        unsafe { *self.saved_esp.get() = esp };
    }

    pub fn is_sane(&self) -> bool {
        self.sanity_constant == TCB_SANITY
    }

    pub fn dir_phys(&self) -> u32 {
        self.dir_phys.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pcb::Pcb;

    #[test_case]
    fn new_tcb_is_sane_and_not_blocked() {
        let pcb = Arc::new(Pcb::new_root());
        let tcb = Tcb::new(Tid(5), pcb, 0x1000);
        assert!(tcb.is_sane());
        assert!(!tcb.blocked.load(Ordering::Relaxed));
        assert!(!tcb.descheduled.load(Ordering::Relaxed));
    }
}
