//! Process/thread lifecycle (spec §4.9): PCB/TCB storage, fork family,
//! exec, wait/vanish and the zombie reaping they share.

pub mod exec;
pub mod fork;
pub mod pcb;
pub mod table;
pub mod tcb;
pub mod thread_fork;
pub mod vanish;
pub mod wait;

use alloc::sync::Arc;

use crate::{
    config::KERNEL_STACK_PAGES,
    ids::{next_tid, Tid},
    mm::frame_allocator,
    process::{pcb::Pcb, tcb::Tcb},
};

/// Allocate a fresh kernel stack (`KERNEL_STACK_PAGES` pages, currently
/// always 1) and build the TCB that lives at its base under the given tid.
/// The caller picks the tid (rather than this function generating one)
/// because a task's first thread must carry the same tid as `Pcb::original_tid`.
pub fn spawn_thread(pcb: Arc<Pcb>, tid: Tid) -> Arc<Tcb> {
    debug_assert_eq!(KERNEL_STACK_PAGES, 1, "Tcb::new assumes a one-page kernel stack");
    let kstack_base = frame_allocator::alloc_frame().expect("out of kernel stack frames");
    let tcb = Arc::new(Tcb::new(tid, pcb, kstack_base));
    table::register_tcb(tcb.clone());
    tcb
}

/// Allocate a brand new tid and spawn its TCB in one step, for any thread
/// that is not a task's lead thread (`thread_fork`).
pub fn spawn_additional_thread(pcb: Arc<Pcb>) -> Arc<Tcb> {
    spawn_thread(pcb, next_tid())
}

pub fn current_pcb() -> Arc<Pcb> {
    let tid = crate::sched::current_tid();
    table::lookup_tcb(tid)
        .map(|tcb| tcb.pcb.clone())
        .expect("current thread has no TCB")
}

pub fn current_tcb() -> Arc<Tcb> {
    table::lookup_tcb(crate::sched::current_tid()).expect("current thread has no TCB")
}

/// Used by `boot` to seed pid 0 / tid 0, which never runs user code and
/// exists only as the scheduler's idle fallback.
pub fn init_idle_task() -> (Tid, Arc<Pcb>) {
    let pcb = Arc::new(Pcb::new_root());
    table::register_pcb(pcb.clone());
    let tcb = spawn_thread(pcb.clone(), crate::ids::IDLE_TID);
    crate::sched::set_current_at_boot(tcb.tid);
    (tcb.tid, pcb)
}
