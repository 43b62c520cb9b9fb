//! End-to-end scenarios for the scheduler's thread-bookkeeping surface,
//! run as a freestanding QEMU binary.
//!
//! `sched::block_current`/`next`/`yield_to`/`sleep`/`deschedule` all bottom
//! out in `arch::x86::trampolines::context_switch`, assembly outside this
//! crate, so they can't actually run here. The functions exercised below
//! never call `switch_to`: `enqueue_new_thread`, `make_runnable`,
//! `force_retire`, `cancel_sleep`, and `is_descheduled` are the part of the
//! scheduler's contract that's pure bookkeeping over `process::table` and a
//! TCB's own flags, which is exactly what `task_vanish`'s sibling-retirement
//! loop and `wake_due_sleepers`'s staleness check rely on.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(corvid_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use alloc::{string::String, sync::Arc, vec::Vec};
use core::sync::atomic::Ordering;

use corvid_kernel::{
    ids::Tid,
    process::{pcb::Pcb, table, tcb::Tcb},
    sched,
};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    corvid_kernel::boot::test_init();
    test_main();
    corvid_kernel::arch::halt_loop();
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    corvid_kernel::test_framework::test_panic_handler(info)
}

#[test_case]
fn make_runnable_clears_blocked_and_descheduled_bookkeeping() {
    let pcb = Arc::new(Pcb::new(None, String::from("waiter"), Tid(201)));
    let tcb = Arc::new(Tcb::new(Tid(201), pcb, 0x1000));
    table::register_tcb(tcb.clone());

    // Stand in for what `sched::deschedule` would have set on the thread
    // it just parked; `deschedule` itself isn't reachable without a live
    // scheduler loop to block into.
    tcb.blocked.store(true, Ordering::Release);
    tcb.descheduled.store(true, Ordering::Release);
    assert!(sched::is_descheduled(Tid(201)));

    sched::make_runnable(Tid(201));

    assert!(!tcb.blocked.load(Ordering::Acquire));
    assert!(!tcb.descheduled.load(Ordering::Acquire));
    assert!(!sched::is_descheduled(Tid(201)));

    table::remove_tcb(Tid(201));
}

#[test_case]
fn force_retire_bumps_sleep_generation_so_a_pending_wakeup_goes_stale() {
    let pcb = Arc::new(Pcb::new(None, String::from("sleeper"), Tid(202)));
    let tcb = Arc::new(Tcb::new(Tid(202), pcb, 0x1000));
    table::register_tcb(tcb.clone());

    let generation_when_it_fell_asleep = tcb.sleep_generation.load(Ordering::Acquire);

    sched::force_retire(Tid(202));

    // `wake_due_sleepers`'s `is_live` closure compares a heap entry's
    // recorded generation against this value; task_vanish retiring a
    // sleeping sibling must move it forward so any still-pending entry is
    // treated as stale instead of waking a tid that's since been reused.
    assert_ne!(
        tcb.sleep_generation.load(Ordering::Acquire),
        generation_when_it_fell_asleep
    );

    table::remove_tcb(Tid(202));
}

#[test_case]
fn task_vanish_sibling_loop_finds_every_thread_of_the_task_but_spares_other_tasks() {
    let pcb = Arc::new(Pcb::new(None, String::from("multithreaded"), Tid(210)));
    table::register_pcb(pcb.clone());

    let mine: Vec<Tid> = [Tid(210), Tid(211), Tid(212)]
        .into_iter()
        .map(|tid| {
            let tcb = Arc::new(Tcb::new(tid, pcb.clone(), 0x1000));
            table::register_tcb(tcb);
            sched::enqueue_new_thread(tid);
            tid
        })
        .collect();

    let other_pcb = Arc::new(Pcb::new(None, String::from("unrelated"), Tid(220)));
    table::register_pcb(other_pcb.clone());
    let other_tcb = Arc::new(Tcb::new(Tid(220), other_pcb.clone(), 0x1000));
    table::register_tcb(other_tcb);

    let mut siblings = table::tids_for_pid(pcb.pid);
    siblings.sort_by_key(|tid| tid.0);
    assert_eq!(siblings, mine);

    // `task_vanish` retires every sibling but the caller itself; simulate
    // that for tids 211/212, leaving 210 (standing in for "me") alone.
    for tid in [Tid(211), Tid(212)] {
        sched::force_retire(tid);
        table::remove_tcb(tid);
    }

    let remaining = table::tids_for_pid(pcb.pid);
    assert_eq!(remaining, alloc::vec![Tid(210)]);

    table::remove_tcb(Tid(210));
    table::remove_pcb(pcb.pid);
    table::remove_tcb(Tid(220));
    table::remove_pcb(other_pcb.pid);
}
