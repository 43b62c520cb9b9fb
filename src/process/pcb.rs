//! Process control block (spec §3 "PCB", §4.8).

use alloc::{
    collections::VecDeque,
    string::String,
    vec::Vec,
};
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use spin::Mutex;

use crate::{
    ids::{next_pid, Pid, Tid},
    mm::vmm::AddressSpace,
    sync::condvar::KCondvar,
};

/// Exit status of a thread/task that has vanished but not yet been reaped,
/// kept on the parent's zombie list (spec §4.9 "status block").
pub struct ZombieStatus {
    pub pid: Pid,
    pub exit_status: i32,
}

pub struct Pcb {
    pub pid: Pid,
    pub parent: Mutex<Option<Pid>>,
    pub program_name: Mutex<String>,

    /// Physical address of the page directory shared by every thread in
    /// this task.
    pub dir_phys: AtomicU32,

    /// Live (non-vanished) thread count; the task vanishes as a whole only
    /// once this reaches zero (spec §4.9 "task_vanish").
    pub thread_count: AtomicU32,

    pub children: Mutex<Vec<Pid>>,
    pub zombies: Mutex<VecDeque<ZombieStatus>>,
    pub wait_signal: KCondvar,

    pub exit_status: AtomicI32,
    pub original_tid: Tid,
    pub vanished: AtomicBool,

    /// `None` until the task's image is loaded (idle, and a freshly forked
    /// child before its address space is duplicated in).
    pub address_space: Mutex<Option<AddressSpace>>,
}

impl Pcb {
    pub fn new(parent: Option<Pid>, program_name: String, original_tid: Tid) -> Self {
        Self {
            pid: next_pid(),
            parent: Mutex::new(parent),
            program_name: Mutex::new(program_name),
            dir_phys: AtomicU32::new(0),
            thread_count: AtomicU32::new(1),
            children: Mutex::new(Vec::new()),
            zombies: Mutex::new(VecDeque::new()),
            wait_signal: KCondvar::new(),
            exit_status: AtomicI32::new(0),
            original_tid,
            vanished: AtomicBool::new(false),
            address_space: Mutex::new(None),
        }
    }

    /// The idle/init task's PCB: pid 0, no parent, never reaped.
    pub fn new_root() -> Self {
        Self {
            pid: crate::ids::IDLE_PID,
            parent: Mutex::new(None),
            program_name: Mutex::new(String::from("idle")),
            dir_phys: AtomicU32::new(0),
            thread_count: AtomicU32::new(1),
            children: Mutex::new(Vec::new()),
            zombies: Mutex::new(VecDeque::new()),
            wait_signal: KCondvar::new(),
            exit_status: AtomicI32::new(0),
            original_tid: crate::ids::IDLE_TID,
            vanished: AtomicBool::new(false),
            address_space: Mutex::new(None),
        }
    }

    pub fn set_dir_phys(&self, phys: u32) {
        self.dir_phys.store(phys, Ordering::Release);
    }

    pub fn add_child(&self, pid: Pid) {
        self.children.lock().push(pid);
    }

    /// Moves a terminated child from `children` onto the zombie list. The
    /// caller (vanish path) is responsible for adopting its own children to
    /// init first.
    pub fn adopt_zombie(&self, status: ZombieStatus) {
        self.children.lock().retain(|&p| p != status.pid);
        self.zombies.lock().push_back(status);
        self.wait_signal.signal();
    }

    pub fn reap_any_zombie(&self) -> Option<ZombieStatus> {
        self.zombies.lock().pop_front()
    }

    pub fn has_children_or_zombies(&self) -> bool {
        !self.children.lock().is_empty() || !self.zombies.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn zombie_moves_off_children_onto_zombie_list() {
        let pcb = Pcb::new(None, String::from("root_task"), Tid(1));
        pcb.add_child(Pid(7));
        assert!(pcb.has_children_or_zombies());

        pcb.adopt_zombie(ZombieStatus {
            pid: Pid(7),
            exit_status: 42,
        });
        assert!(pcb.children.lock().is_empty());
        let z = pcb.reap_any_zombie().expect("zombie present");
        assert_eq!(z.pid, Pid(7));
        assert_eq!(z.exit_status, 42);
    }
}
