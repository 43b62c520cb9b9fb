//! Kernel-virtual memory allocator (spec §4.2).
//!
//! Addresses from `[USER_MEM_END, 0xFFFF_F000)` back mappings that every
//! task's page directory shares (kernel stacks, bookkeeping structures
//! mapped by the kernel itself, the page-table shadow windows `page_table`
//! allocates for itself, never user-visible). A bump pointer with a free
//! list behind it is enough: allocation here is rare compared to user page
//! faults.
//!
//! KVM's own second-level tables are shared, global state: when one fills
//! and a fresh one has to be created, its directory entry is the one piece
//! of kernel state that must be pushed out to every already-running task's
//! page directory rather than just the requester's, since every existing
//! task mirrored "not present" for that slot back when its own directory
//! was built.

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::vec::Vec;
use spin::Mutex;

use crate::{
    config::{PAGE_SIZE, PHYS_MAP_END},
    error::{KernelError, Result},
    mm::{
        page_table::{EntryFlags, PageDirectory},
        vmm,
    },
    process,
};

/// Allocatable KVM starts right after the permanent physical direct map.
const KVM_START: u32 = PHYS_MAP_END;
const KVM_END: u32 = 0xFFFF_F000;

static NEXT_BUMP: AtomicU32 = AtomicU32::new(KVM_START);
static FREE_LIST: Mutex<Vec<u32>> = Mutex::new(Vec::new());

/// Serializes top-level KVM table creation and its cross-PCB publication
/// (spec §4.2: "the one place cross-PCB mutation happens outside of
/// fork/exec/vanish").
static PUBLISH_LOCK: Mutex<()> = Mutex::new(());

fn reserve_addr() -> Option<u32> {
    if let Some(addr) = FREE_LIST.lock().pop() {
        return Some(addr);
    }
    let addr = NEXT_BUMP.fetch_add(PAGE_SIZE as u32, Ordering::AcqRel);
    if addr >= KVM_END {
        return None;
    }
    Some(addr)
}

/// Reserve one page of kernel-virtual address space and map `phys` there in
/// the master directory, publishing the mapping's top-level directory entry
/// into every other live task's directory if this is the first allocation
/// to fall into a fresh second-level KVM table. `requester` is the
/// directory asking (typically mid-`ensure_table`, building its own shadow
/// window); it's patched directly rather than through the usual
/// `all_pcbs()` walk since its owning PCB's address-space lock is already
/// held by the caller.
pub fn alloc_mapped_page(phys: u32, requester: &PageDirectory) -> Result<u32> {
    let _publish = PUBLISH_LOCK.lock();
    let addr = reserve_addr().ok_or(KernelError::NoVm)?;
    let master = vmm::master_directory();
    let pde_index = PageDirectory::pde_index(addr);
    let fresh_table = !master.pde_present(pde_index);
    master.map(addr, phys, EntryFlags::PRESENT | EntryFlags::WRITABLE)?;

    if fresh_table {
        let pde_value = master.raw_pde(pde_index);
        requester.install_shared_pde(pde_index, pde_value);
        for pcb in process::table::all_pcbs() {
            if pcb.dir_phys.load(Ordering::Acquire) == requester.phys {
                continue;
            }
            if let Some(space) = pcb.address_space.lock().as_ref() {
                space.directory.install_shared_pde(pde_index, pde_value);
            }
        }
    }
    Ok(addr)
}

/// Release a KVM page previously returned by [`alloc_mapped_page`], clearing
/// its mapping in the master directory and returning the address to the
/// free list.
pub fn free_page(addr: u32) {
    debug_assert!((KVM_START..KVM_END).contains(&addr));
    let _publish = PUBLISH_LOCK.lock();
    vmm::master_directory().unmap(addr);
    FREE_LIST.lock().push(addr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn allocations_stay_within_the_kvm_range() {
        let a = reserve_addr().expect("kvm range exhausted in test");
        let b = reserve_addr().expect("kvm range exhausted in test");
        assert_ne!(a, b);
        assert!(a >= KVM_START && a < KVM_END);
        assert!(b >= KVM_START && b < KVM_END);
    }

    #[test_case]
    fn freed_addresses_are_reused_before_bumping_further() {
        let a = reserve_addr().expect("kvm range exhausted in test");
        FREE_LIST.lock().push(a);
        let b = reserve_addr().expect("kvm range exhausted in test");
        assert_eq!(a, b);
    }
}
