//! 32-bit two-level page directory/table manager (spec §4.3).
//!
//! Every task's page directory mirrors the same kernel PDEs (the physical
//! direct map and the rest of KVM) so kernel code sees identical mappings
//! regardless of which address space is current; only the lower, per-task
//! PDEs differ. Page-table memory itself lives in physical frames and is
//! accessed either through the direct map (`phys_to_kernel_ptr`) or, once a
//! table has one, through its cached KVM shadow window (`virtual_dir`).

use alloc::vec::Vec;

use bitflags::bitflags;
use spin::Mutex;

use crate::{
    config::{PAGE_SIZE, PAGE_TABLE_ENTRIES, PHYS_MAP_BASE, USER_MEM_START},
    error::Result,
    mm::{frame_allocator, kvm},
};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        /// Software-only bit (ignored by hardware): marks a present,
        /// read-only mapping as zero-filled-on-write (spec §4.4 "ZFOD").
        const ZFOD     = 1 << 9;
    }
}

/// Physical address of a frame that has been zeroed, used as every ZFOD
/// page's shared backing until the first write. Created lazily.
///
/// Still an `.expect()`-panicking boot-adjacent simplification (DESIGN.md):
/// this runs once, the first time any ZFOD page is ever mapped, which in
/// practice is long before memory pressure is a realistic concern.
fn zero_frame_phys() -> u32 {
    static mut ZERO_FRAME: u32 = 0;
    static INIT: spin::Once<u32> = spin::Once::new();
    *INIT.call_once(|| {
        let frame = frame_allocator::alloc_frame().expect("out of memory allocating zero frame");
        unsafe {
            core::ptr::write_bytes(phys_to_kernel_ptr(frame), 0, PAGE_SIZE);
            ZERO_FRAME = frame;
        }
        frame
    })
}

/// Translate a physical address to a kernel-virtual pointer through the
/// permanent direct map.
pub fn phys_to_kernel_ptr(phys: u32) -> *mut u8 {
    (PHYS_MAP_BASE + phys) as *mut u8
}

fn table_slot(table_phys: u32, index: usize) -> *mut u32 {
    (phys_to_kernel_ptr(table_phys) as *mut u32).wrapping_add(index)
}

/// One task's page directory, identified by the physical address of its
/// directory frame.
pub struct PageDirectory {
    pub phys: u32,
    /// Shadow virtual directory (spec §3 "Virtual-directory shadow"): the
    /// KVM address of each present second-level table, keyed by PDE index,
    /// `0` meaning "not cached, fall back to the direct map." Lets the rest
    /// of the kernel address a table it knows is present the same way it
    /// addresses any other KVM object, without special-casing physical vs.
    /// virtual addressing.
    shadow: Mutex<Vec<u32>>,
    /// `false` only for the boot-time master directory (see
    /// `new_blank_boot`), which backs KVM itself and so cannot recursively
    /// ask KVM for a window onto its own tables.
    use_kvm_shadow: bool,
}

impl PageDirectory {
    /// Allocate a fresh, zeroed page directory. The caller (`mm::vmm`) is
    /// responsible for copying in the shared kernel PDEs afterward.
    pub fn new_blank() -> Result<Self> {
        let virt = frame_allocator::alloc_kernel_page()?;
        unsafe { core::ptr::write_bytes(virt as *mut u8, 0, PAGE_SIZE) };
        Ok(Self {
            phys: virt - PHYS_MAP_BASE,
            shadow: Mutex::new(alloc::vec![0u32; PAGE_TABLE_ENTRIES]),
            use_kvm_shadow: true,
        })
    }

    /// Boot-only constructor for the master directory that backs KVM: using
    /// the ordinary KVM-shadowed path here would recurse (KVM's own growth
    /// asks the master directory to map a page, which would need a shadow
    /// window allocated from KVM...), so the master directory's own tables
    /// are only ever reached through the direct map.
    pub(crate) fn new_blank_boot() -> Self {
        let phys = frame_allocator::alloc_frame().expect("out of memory allocating the master page directory");
        unsafe {
            core::ptr::write_bytes(phys_to_kernel_ptr(phys), 0, PAGE_SIZE);
        }
        Self {
            phys,
            shadow: Mutex::new(alloc::vec![0u32; PAGE_TABLE_ENTRIES]),
            use_kvm_shadow: false,
        }
    }

    pub(crate) fn pde_index(virt: u32) -> usize {
        (virt >> 22) as usize
    }

    fn pte_index(virt: u32) -> usize {
        ((virt >> 12) & 0x3FF) as usize
    }

    /// Copy PDE `index` from `other`, used to mirror the shared kernel
    /// region into a newly created directory.
    pub fn copy_pde_from(&self, other: &PageDirectory, index: usize) {
        unsafe {
            let value = table_slot(other.phys, index).read();
            table_slot(self.phys, index).write(value);
        }
    }

    fn pde_raw(&self, index: usize) -> u32 {
        unsafe { table_slot(self.phys, index).read() }
    }

    pub(crate) fn pde_present(&self, index: usize) -> bool {
        self.pde_raw(index) & EntryFlags::PRESENT.bits() != 0
    }

    pub(crate) fn raw_pde(&self, index: usize) -> u32 {
        self.pde_raw(index)
    }

    /// Install a raw PDE value copied from another directory's corresponding
    /// slot. Used only to publish a freshly created shared KVM table into
    /// every live task's directory (spec §4.2's one cross-PCB mutation site
    /// outside fork/exec/vanish).
    pub(crate) fn install_shared_pde(&self, index: usize, value: u32) {
        unsafe { table_slot(self.phys, index).write(value) };
    }

    /// Resolve `pde_index`'s table to a pointer, preferring its cached KVM
    /// shadow window over the direct map (both address the same physical
    /// frame; the shadow is just how objects above the direct map, like
    /// this table, are normally reached).
    fn table_ptr(&self, pde_index: usize, table_phys: u32) -> *mut u32 {
        let cached = self.shadow.lock()[pde_index];
        if cached != 0 {
            cached as *mut u32
        } else {
            phys_to_kernel_ptr(table_phys) as *mut u32
        }
    }

    fn ensure_table(&self, pde_index: usize) -> Result<u32> {
        let raw = self.pde_raw(pde_index);
        if raw & EntryFlags::PRESENT.bits() != 0 {
            return Ok(raw & !0xFFF);
        }
        let table_virt = frame_allocator::alloc_kernel_page()?;
        let table_phys = table_virt - PHYS_MAP_BASE;
        unsafe {
            core::ptr::write_bytes(table_virt as *mut u8, 0, PAGE_SIZE);
            let entry = table_phys | EntryFlags::PRESENT.bits() | EntryFlags::WRITABLE.bits() | EntryFlags::USER.bits();
            table_slot(self.phys, pde_index).write(entry);
        }
        if self.use_kvm_shadow {
            let kvaddr = kvm::alloc_mapped_page(table_phys, self)?;
            self.shadow.lock()[pde_index] = kvaddr;
        }
        Ok(table_phys)
    }

    /// Map one page, allocating the second-level table on demand.
    pub fn map(&self, virt: u32, phys: u32, flags: EntryFlags) -> Result<()> {
        debug_assert_eq!(virt % PAGE_SIZE as u32, 0);
        let pde = Self::pde_index(virt);
        let pte = Self::pte_index(virt);
        let table_phys = self.ensure_table(pde)?;
        let entry = (phys & !0xFFF) | flags.bits();
        unsafe {
            self.table_ptr(pde, table_phys).add(pte).write(entry);
        }
        Ok(())
    }

    /// Map `virt` copy-on-write against the shared zero frame (spec §4.4
    /// "ZFOD").
    pub fn map_zfod(&self, virt: u32, user: bool) -> Result<()> {
        let mut flags = EntryFlags::PRESENT | EntryFlags::ZFOD;
        if user {
            flags |= EntryFlags::USER;
        }
        self.map(virt, zero_frame_phys(), flags)
    }

    pub fn unmap(&self, virt: u32) -> Option<(u32, EntryFlags)> {
        let pde = Self::pde_index(virt);
        let raw_pde = self.pde_raw(pde);
        if raw_pde & EntryFlags::PRESENT.bits() == 0 {
            return None;
        }
        let table_phys = raw_pde & !0xFFF;
        let pte = Self::pte_index(virt);
        unsafe {
            let ptr = self.table_ptr(pde, table_phys).add(pte);
            let entry = ptr.read();
            if entry & EntryFlags::PRESENT.bits() == 0 {
                return None;
            }
            ptr.write(0);
            Some((entry & !0xFFF, EntryFlags::from_bits_truncate(entry & 0xFFF)))
        }
    }

    pub fn translate(&self, virt: u32) -> Option<(u32, EntryFlags)> {
        let pde = Self::pde_index(virt);
        let raw_pde = self.pde_raw(pde);
        if raw_pde & EntryFlags::PRESENT.bits() == 0 {
            return None;
        }
        let table_phys = raw_pde & !0xFFF;
        let pte = Self::pte_index(virt);
        let raw_pte = unsafe { self.table_ptr(pde, table_phys).add(pte).read() };
        if raw_pte & EntryFlags::PRESENT.bits() == 0 {
            return None;
        }
        Some((raw_pte & !0xFFF, EntryFlags::from_bits_truncate(raw_pte & 0xFFF)))
    }

    /// Resolve a ZFOD fault by allocating a real, zeroed frame and making
    /// the mapping writable.
    pub fn resolve_zfod(&self, virt: u32) -> Result<bool> {
        let Some((_, flags)) = self.translate(virt) else {
            return Ok(false);
        };
        if !flags.contains(EntryFlags::ZFOD) {
            return Ok(false);
        }
        let frame = frame_allocator::alloc_user_frame()?;
        unsafe {
            core::ptr::write_bytes(phys_to_kernel_ptr(frame), 0, PAGE_SIZE);
        }
        let user = flags.contains(EntryFlags::USER);
        let mut new_flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
        if user {
            new_flags |= EntryFlags::USER;
        }
        self.map(virt, frame, new_flags)?;
        Ok(true)
    }

    /// First PDE index that belongs to user space, below which everything
    /// is per-task and above which everything is shared/global.
    pub fn user_pde_range() -> core::ops::Range<usize> {
        Self::pde_index(USER_MEM_START)..PAGE_TABLE_ENTRIES
    }

    /// KVM addresses this directory claimed as shadow windows onto its own
    /// second-level tables, for `vmm::teardown` to release alongside the
    /// table frames themselves.
    pub(crate) fn shadow_addrs(&self) -> Vec<u32> {
        self.shadow.lock().iter().copied().filter(|&addr| addr != 0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn pde_and_pte_index_split_matches_x86_two_level_layout() {
        assert_eq!(PageDirectory::pde_index(0x0000_0000), 0);
        assert_eq!(PageDirectory::pde_index(0x0040_0000), 1);
        assert_eq!(PageDirectory::pte_index(0x0000_1000), 1);
        assert_eq!(PageDirectory::pte_index(0x0040_1000), 1);
    }
}
