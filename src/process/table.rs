//! Global pid/tid registries (spec §3 "PID table"/"TID table").
//!
//! Every live task and thread is reachable by id through these maps so the
//! scheduler, syscall dispatch and the vanish/wait path never need to pass
//! raw pointers around; they hand out `Arc` clones instead.

use alloc::{collections::BTreeMap, sync::Arc};

use spin::RwLock;

use crate::{
    ids::{Pid, Tid},
    process::{pcb::Pcb, tcb::Tcb},
};

static PIDS: RwLock<BTreeMap<Pid, Arc<Pcb>>> = RwLock::new(BTreeMap::new());
static TIDS: RwLock<BTreeMap<Tid, Arc<Tcb>>> = RwLock::new(BTreeMap::new());

/// Pid of the first real task `boot::start_init_task` starts, set once at
/// boot. The task that owns this pid never vanishes (spec §6 "the init task
/// is expected never to vanish") and is where `process::vanish` reparents
/// orphaned children, per spec §4.9.
static INIT_PID: RwLock<Option<Pid>> = RwLock::new(None);

pub fn set_init_pid(pid: Pid) {
    *INIT_PID.write() = Some(pid);
}

/// Falls back to the idle task's pid if init hasn't started yet (or never
/// will, e.g. under `#[test_case]`), so orphans always have somewhere to
/// go rather than a lookup failure silently dropping the reparent.
pub fn init_pid() -> Pid {
    INIT_PID.read().unwrap_or(crate::ids::IDLE_PID)
}

pub fn register_pcb(pcb: Arc<Pcb>) {
    PIDS.write().insert(pcb.pid, pcb);
}

pub fn register_tcb(tcb: Arc<Tcb>) {
    TIDS.write().insert(tcb.tid, tcb);
}

pub fn lookup_pcb(pid: Pid) -> Option<Arc<Pcb>> {
    PIDS.read().get(&pid).cloned()
}

/// Every live task's PCB, for `mm::kvm`'s cross-PCB publication of a freshly
/// created shared KVM table (spec §4.2).
pub fn all_pcbs() -> alloc::vec::Vec<Arc<Pcb>> {
    PIDS.read().values().cloned().collect()
}

pub fn lookup_tcb(tid: Tid) -> Option<Arc<Tcb>> {
    TIDS.read().get(&tid).cloned()
}

pub fn remove_pcb(pid: Pid) -> Option<Arc<Pcb>> {
    PIDS.write().remove(&pid)
}

pub fn remove_tcb(tid: Tid) -> Option<Arc<Tcb>> {
    TIDS.write().remove(&tid)
}

/// Every tid currently belonging to `pid`'s task, for `task_vanish` to
/// retire siblings of the thread that called it.
pub fn tids_for_pid(pid: Pid) -> alloc::vec::Vec<Tid> {
    TIDS.read()
        .values()
        .filter(|tcb| tcb.pcb.pid == pid)
        .map(|tcb| tcb.tid)
        .collect()
}

pub fn pcb_count() -> usize {
    PIDS.read().len()
}

pub fn tcb_count() -> usize {
    TIDS.read().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test_case]
    fn register_then_lookup_round_trips() {
        let pcb = Arc::new(Pcb::new(None, String::from("test_task"), Tid(1)));
        let pid = pcb.pid;
        register_pcb(pcb);
        assert!(lookup_pcb(pid).is_some());
        assert!(remove_pcb(pid).is_some());
        assert!(lookup_pcb(pid).is_none());
    }
}
