//! Preemptive round-robin scheduler (spec §4.6).
//!
//! The currently running thread is never a member of `runnable`; it is
//! pushed back on only when it keeps running (voluntary yield or timer
//! preemption via `next()`/`cycle`). Blocking paths (`block_current`) pop
//! whoever's next without requeuing the caller, which must already be
//! reachable from wherever it's waiting (a condvar's waiter list, a
//! mutex's waiter list, or the sleep heap).
//!
//! `quick_lock`/`quick_unlock` is the interrupt-disable-with-nesting
//! primitive every other piece of `sched` and `sync` is built on (spec §5
//! "quick_lock" ordering guarantees).

pub mod queue;
pub mod sleep;

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use crate::{
    arch,
    error::{KernelError, Result},
    ids::{Tid, IDLE_TID},
    mm::frame_allocator,
    process,
};
use queue::Ring;
use sleep::SleepHeap;

static CURRENT: AtomicU32 = AtomicU32::new(IDLE_TID.0);
static LOCK_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// A vanished thread's kernel stack frame, freed once some other thread is
/// safely running on a stack of its own (spec §4.9 "kill stack"): a thread
/// can never free the stack it is still executing on.
static PENDING_KSTACK_FREE: AtomicU32 = AtomicU32::new(0);

struct SchedState {
    runnable: Ring,
    sleeping: SleepHeap,
}

static STATE: Mutex<SchedState> = Mutex::new(SchedState {
    runnable: Ring::new(),
    sleeping: SleepHeap::new(),
});

/// RAII interrupt-disable guard with nesting support, so a function that
/// takes the quick-lock can call another that also takes it without
/// re-enabling interrupts early.
#[must_use]
pub struct QuickLockGuard {
    _private: (),
}

pub fn quick_lock() -> QuickLockGuard {
    if LOCK_DEPTH.fetch_add(1, Ordering::AcqRel) == 0 {
        arch::x86::interrupts::disable();
    }
    QuickLockGuard { _private: () }
}

impl Drop for QuickLockGuard {
    fn drop(&mut self) {
        if LOCK_DEPTH.fetch_sub(1, Ordering::AcqRel) == 1 {
            arch::x86::interrupts::enable();
        }
    }
}

pub fn current_tid() -> Tid {
    Tid(CURRENT.load(Ordering::Acquire))
}

/// Set by `boot` once the idle TCB is registered, before any interrupt can
/// fire.
pub fn set_current_at_boot(tid: Tid) {
    CURRENT.store(tid.0, Ordering::Release);
}

/// Add a freshly created thread to the back of the ready queue (spec §4.9
/// "fork"/"thread_fork").
pub fn enqueue_new_thread(tid: Tid) {
    let _guard = quick_lock();
    STATE.lock().runnable.push_back(tid);
}

fn switch_to(new_tid: Tid) {
    let old_tid = current_tid();
    if new_tid == old_tid {
        return;
    }
    let old_tcb = process::table::lookup_tcb(old_tid);
    let new_tcb = match process::table::lookup_tcb(new_tid) {
        Some(tcb) => tcb,
        // Vanished between being made runnable and being dispatched; drop
        // it silently, the next tick will pick someone else.
        None => return,
    };

    CURRENT.store(new_tid.0, Ordering::Release);
    arch::x86::gdt::set_kernel_stack(new_tcb.kstack_top);

    let new_cr3 = match &old_tcb {
        Some(old) if old.dir_phys() == new_tcb.dir_phys() => 0,
        _ => new_tcb.dir_phys(),
    };
    let save_esp_ptr = old_tcb
        .as_deref()
        .map(|tcb| unsafe { tcb.saved_esp_ptr() })
        .unwrap_or(core::ptr::null_mut());
    let resume_esp = unsafe { *new_tcb.saved_esp_ptr() };

    unsafe {
        arch::x86::trampolines::context_switch(save_esp_ptr, resume_esp, new_cr3);
    }
    reclaim_pending_kstack();
}

/// Record `kstack_base` as safe to free the next time execution lands on a
/// different stack. Called by the vanish path instead of freeing its own
/// stack frame directly.
pub fn free_kstack_after_switch(kstack_base: u32) {
    PENDING_KSTACK_FREE.store(kstack_base, Ordering::Release);
}

fn reclaim_pending_kstack() {
    let phys = PENDING_KSTACK_FREE.swap(0, Ordering::AcqRel);
    if phys != 0 {
        unsafe { frame_allocator::free_frame(phys) };
    }
}

fn cycle_and_switch() {
    let old = current_tid();
    let new = STATE.lock().runnable.cycle(old);
    switch_to(new);
}

/// Voluntary yield or timer preemption: requeue the current thread at the
/// tail and dispatch the new head.
pub fn next() {
    let _guard = quick_lock();
    cycle_and_switch();
}

/// Abandon the current thread without requeuing it; the caller is
/// responsible for having already recorded it somewhere it can be found
/// again (a wait list or the sleep heap).
pub fn block_current() {
    let new = STATE.lock().runnable.pop_front_or(IDLE_TID);
    switch_to(new);
}

/// Splice `tid` back onto the front of the ready queue and clear its
/// blocked/descheduled bookkeeping. Used both by `sync`'s wakeups and by
/// the `make_runnable` syscall.
pub fn make_runnable(tid: Tid) {
    let _guard = quick_lock();
    if let Some(tcb) = process::table::lookup_tcb(tid) {
        tcb.blocked.store(false, Ordering::Release);
        tcb.descheduled.store(false, Ordering::Release);
    }
    STATE.lock().runnable.push_front(tid);
}

/// True if `tid` is currently marked descheduled, for `make_runnable`'s
/// "target not descheduled" error case (spec §4.6 edge cases).
pub fn is_descheduled(tid: Tid) -> bool {
    process::table::lookup_tcb(tid)
        .map(|tcb| tcb.descheduled.load(Ordering::Acquire))
        .unwrap_or(false)
}

/// `read_reject` is run with interrupts already disabled, so a concurrent
/// `make_runnable(current)` from another thread cannot land between the
/// check and the thread actually leaving the ready queue (spec §5
/// "deschedule/make_runnable" ordering guarantee).
pub fn deschedule(read_reject: impl FnOnce() -> i32) {
    let _guard = quick_lock();
    if read_reject() != 0 {
        return;
    }
    let me = current_tid();
    if let Some(tcb) = process::table::lookup_tcb(me) {
        tcb.descheduled.store(true, Ordering::Release);
    }
    block_current();
}

/// `target == None` means "let the scheduler pick"; `Some(tid)` yields
/// directly to that thread, failing if it isn't currently runnable.
pub fn yield_to(target: Option<Tid>) -> Result<()> {
    let _guard = quick_lock();
    let Some(tid) = target else {
        cycle_and_switch();
        return Ok(());
    };
    let me = current_tid();
    if tid == me {
        return Ok(());
    }
    if !STATE.lock().runnable.remove(tid) {
        return Err(KernelError::Fail);
    }
    STATE.lock().runnable.push_back(me);
    switch_to(tid);
    Ok(())
}

/// Block the current thread until at least `ticks` timer ticks have
/// elapsed (spec §4.6 "sleep").
pub fn sleep(ticks: u32) {
    if ticks == 0 {
        return;
    }
    let _guard = quick_lock();
    let me = current_tid();
    let wake_at = crate::drivers::timer::ticks() + ticks as u64;
    let generation = process::table::lookup_tcb(me)
        .map(|tcb| tcb.sleep_generation.load(Ordering::Acquire))
        .unwrap_or(0);
    STATE.lock().sleeping.insert(me, wake_at, generation);
    if let Some(tcb) = process::table::lookup_tcb(me) {
        tcb.blocked.store(true, Ordering::Release);
    }
    block_current();
}

/// Called from the timer IRQ after advancing the tick counter.
pub fn wake_due_sleepers(now: u64) {
    let _guard = quick_lock();
    let woken = {
        let mut state = STATE.lock();
        state.sleeping.pop_due(now, |entry| {
            process::table::lookup_tcb(entry.tid)
                .map(|tcb| tcb.sleep_generation.load(Ordering::Acquire) == entry.generation)
                .unwrap_or(false)
        })
    };
    if woken.is_empty() {
        return;
    }
    let mut state = STATE.lock();
    for tid in woken {
        if let Some(tcb) = process::table::lookup_tcb(tid) {
            tcb.blocked.store(false, Ordering::Release);
        }
        state.runnable.push_front(tid);
    }
}

/// Remove a thread that is not the one currently running from every place
/// the scheduler itself can find it (the ready ring, the sleep heap).
/// `task_vanish` uses this to retire siblings of the thread that called it;
/// it cannot reach a thread parked in some other kernel wait queue (a
/// mutex's or condvar's waiter list) and leaves those be.
pub fn force_retire(tid: Tid) {
    let _guard = quick_lock();
    STATE.lock().runnable.remove(tid);
    cancel_sleep(tid);
}

/// Invalidate any pending sleep-heap entry for `tid`, called from the
/// vanish path so a heap entry for an exited thread is discarded instead
/// of waking a tid that's been reused.
pub fn cancel_sleep(tid: Tid) {
    if let Some(tcb) = process::table::lookup_tcb(tid) {
        tcb.sleep_generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn quick_lock_nests_without_reenabling_early() {
        let outer = quick_lock();
        let inner = quick_lock();
        assert_eq!(LOCK_DEPTH.load(Ordering::Acquire), 2);
        drop(inner);
        assert_eq!(LOCK_DEPTH.load(Ordering::Acquire), 1);
        drop(outer);
        assert_eq!(LOCK_DEPTH.load(Ordering::Acquire), 0);
    }
}
