//! `thread_fork`: add a new thread to the calling task, sharing its
//! address space, which resumes as if `thread_fork` had returned 0 in the
//! new thread and the new thread's tid in the caller (spec §4.9).

use core::sync::atomic::Ordering;

use crate::{
    error::Result,
    ids::Tid,
    process::{self, fork::prime_fork_child},
    syscall::Ureg,
};

pub fn thread_fork_current(ureg: &Ureg) -> Result<Tid> {
    let pcb = process::current_pcb();
    pcb.thread_count.fetch_add(1, Ordering::AcqRel);

    let new_tid = crate::ids::next_tid();
    let tcb = process::spawn_thread(pcb, new_tid);
    prime_fork_child(&tcb, ureg);
    crate::sched::enqueue_new_thread(tcb.tid);
    Ok(new_tid)
}
