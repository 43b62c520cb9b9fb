//! `vanish`/`task_vanish`: thread and whole-task termination (spec §4.9).
//!
//! A plain thread exit only retires the calling thread; the task as a
//! whole becomes a zombie (reparenting its children, handing a status
//! block to its parent) once its last thread vanishes. `task_vanish` forces
//! that whole-task cleanup immediately, taking every sibling thread down
//! with it.

use alloc::sync::Arc;
use core::sync::atomic::Ordering;

use crate::{
    ids::Pid,
    mm::{frame_allocator, vmm},
    process::{self, pcb::ZombieStatus},
};

/// The current thread exits; if it was the task's last thread, the task
/// itself vanishes using whatever status `set_status` last recorded (0 if
/// it was never called).
pub fn thread_vanish() -> ! {
    let pcb = process::current_pcb();
    let me_tcb = process::current_tcb();
    let me = me_tcb.tid;
    crate::sched::cancel_sleep(me);

    let remaining = pcb.thread_count.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        finalize_task(&pcb);
    }
    process::table::remove_tcb(me);
    crate::sched::free_kstack_after_switch(me_tcb.kstack_base);
    crate::sched::block_current();
    unreachable!("a retired thread is never rescheduled")
}

/// The current thread records `status` and forces the whole task to vanish
/// right now, regardless of how many other threads it has.
pub fn task_vanish(status: i32) -> ! {
    let pcb = process::current_pcb();
    pcb.exit_status.store(status, Ordering::Release);

    let me_tcb = process::current_tcb();
    let me = me_tcb.tid;
    for tid in process::table::tids_for_pid(pcb.pid) {
        if tid != me {
            crate::sched::force_retire(tid);
            // Unlike `me`, a sibling retired here is guaranteed not to be
            // the thread currently executing, so its stack can be freed
            // immediately rather than deferred.
            if let Some(sibling) = process::table::remove_tcb(tid) {
                unsafe { frame_allocator::free_frame(sibling.kstack_base) };
            }
        }
    }
    pcb.thread_count.store(0, Ordering::Release);
    finalize_task(&pcb);
    process::table::remove_tcb(me);
    crate::sched::free_kstack_after_switch(me_tcb.kstack_base);
    crate::sched::block_current();
    unreachable!("a retired thread is never rescheduled")
}

/// Reparent any remaining children to init, hand a zombie status block to
/// the parent (or drop it on the floor if this was the boot idle task,
/// which has none), free the task's address space, and remove its own pcb
/// from the table.
fn finalize_task(pcb: &Arc<process::pcb::Pcb>) {
    let orphans = core::mem::take(&mut *pcb.children.lock());
    let init_pid = process::table::init_pid();
    for child_pid in orphans {
        if let Some(child) = process::table::lookup_pcb(child_pid) {
            *child.parent.lock() = Some(init_pid);
            if let Some(init) = process::table::lookup_pcb(init_pid) {
                init.add_child(child_pid);
            }
        }
    }

    if let Some(space) = pcb.address_space.lock().take() {
        vmm::teardown(&space);
    }

    let status = pcb.exit_status.load(Ordering::Acquire);
    let parent_pid: Option<Pid> = *pcb.parent.lock();
    if let Some(parent_pid) = parent_pid {
        if let Some(parent) = process::table::lookup_pcb(parent_pid) {
            parent.adopt_zombie(ZombieStatus {
                pid: pcb.pid,
                exit_status: status,
            });
        }
    }
    process::table::remove_pcb(pcb.pid);
}
