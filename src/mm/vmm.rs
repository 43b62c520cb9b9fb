//! Per-task address space: a page directory plus its region list (spec
//! §4.3/§4.4). One `AddressSpace` is shared by every thread in a task,
//! mirroring the single `dir_phys`/region-list pair PCBs hold in spec §3.

use crate::{
    config::PAGE_SIZE,
    error::{KernelError, Result},
    mm::{
        page_table::{EntryFlags, PageDirectory},
        region::{Region, RegionKind, RegionList},
    },
};

pub struct AddressSpace {
    pub directory: PageDirectory,
    pub regions: RegionList,
    /// Current low end of the user stack region, used by the page-fault
    /// dispatcher to recognize ordinary stack growth.
    pub stack_low: u32,
}

impl AddressSpace {
    /// Build a brand new address space with the shared kernel PDEs mirrored
    /// in from the boot-time master directory.
    pub fn new(stack_top: u32) -> Result<Self> {
        let directory = PageDirectory::new_blank()?;
        for index in PageDirectory::user_pde_range() {
            if index >= master_pde_start() {
                directory.copy_pde_from(master_directory(), index);
            }
        }
        Ok(Self {
            directory,
            regions: RegionList::new(),
            stack_low: stack_top - PAGE_SIZE as u32,
        })
    }

    /// Deep-copy every present, user-writable page into a fresh address
    /// space for `fork` (spec §4.9): no copy-on-write sharing between
    /// parent and child, a plain eager copy of each region. On exhaustion
    /// partway through, the partially built copy is fully torn down and
    /// the parent is left completely untouched (spec §4.8 "fork returns
    /// `EnoMem` with full unwind").
    pub fn duplicate(&self) -> Result<Self> {
        let mut copy = Self::new(self.stack_low + PAGE_SIZE as u32)?;
        if let Err(err) = self.duplicate_into(&mut copy) {
            teardown(&copy);
            return Err(err);
        }
        Ok(copy)
    }

    fn duplicate_into(&self, copy: &mut Self) -> Result<()> {
        for region in self.regions.iter() {
            copy.regions.insert(*region).expect("regions were non-overlapping in the source");
            let mut addr = region.start;
            while addr < region.end {
                match self.directory.translate(addr) {
                    Some((_, flags)) if flags.contains(EntryFlags::ZFOD) => {
                        copy.directory.map_zfod(addr, flags.contains(EntryFlags::USER))?;
                    }
                    Some((phys, flags)) => {
                        let new_frame = crate::mm::frame_allocator::alloc_user_frame()?;
                        unsafe {
                            core::ptr::copy_nonoverlapping(
                                crate::mm::page_table::phys_to_kernel_ptr(phys),
                                crate::mm::page_table::phys_to_kernel_ptr(new_frame),
                                PAGE_SIZE,
                            );
                        }
                        copy.directory.map(addr, new_frame, flags)?;
                    }
                    None => {}
                }
                addr += PAGE_SIZE as u32;
            }
        }
        Ok(())
    }

    pub fn new_pages(&mut self, start: u32, len: u32) -> Result<()> {
        if start % PAGE_SIZE as u32 != 0 || len % PAGE_SIZE as u32 != 0 || len == 0 {
            return Err(KernelError::Args);
        }
        let end = start.checked_add(len).ok_or(KernelError::Args)?;
        self.regions.insert(Region {
            start,
            end,
            writable: true,
            kind: RegionKind::Heap,
        })?;
        let mut addr = start;
        while addr < end {
            if let Err(err) = self.directory.map_zfod(addr, true) {
                // Unwind the pages already mapped before the failure and
                // drop the region we just inserted, leaving the caller's
                // address space exactly as it was before this call.
                let mut unwind = start;
                while unwind < addr {
                    self.directory.unmap(unwind);
                    unwind += PAGE_SIZE as u32;
                }
                self.regions.remove_exact(start, end).ok();
                return Err(err);
            }
            addr += PAGE_SIZE as u32;
        }
        Ok(())
    }

    pub fn remove_pages(&mut self, start: u32, len: u32) -> Result<()> {
        let end = start.checked_add(len).ok_or(KernelError::Args)?;
        let region = self.regions.remove_exact(start, end)?;
        let mut addr = region.start;
        while addr < region.end {
            if let Some((phys, flags)) = self.directory.unmap(addr) {
                if !flags.contains(EntryFlags::ZFOD) {
                    crate::mm::frame_allocator::free_user_frame(phys);
                }
            }
            addr += PAGE_SIZE as u32;
        }
        Ok(())
    }
}

fn master_pde_start() -> usize {
    PageDirectory::user_pde_range().start
}

/// Boot-time master directory every task's shared PDEs are copied from, set
/// up once during `boot::init` after `kvm`/the direct map are mapped.
static MASTER: spin::Once<PageDirectory> = spin::Once::new();

pub fn init_master(build: impl FnOnce(&PageDirectory)) {
    MASTER.call_once(|| {
        let dir = PageDirectory::new_blank_boot();
        build(&dir);
        dir
    });
}

pub(crate) fn master_directory() -> &'static PageDirectory {
    MASTER.get().expect("mm::vmm::init_master not called before first AddressSpace::new")
}

/// Unmap and free every page an address space's regions claim, plus the
/// second-level page-table frames and KVM shadow windows `ensure_table`
/// allocated along the way, and finally the directory's own frame. Shared
/// between `process::vanish`'s normal task teardown and `duplicate`'s
/// mid-copy failure unwind (spec §4.8 "full unwind", §4.9 "free_user_space").
pub(crate) fn teardown(space: &AddressSpace) {
    for region in space.regions.iter() {
        let mut addr = region.start;
        while addr < region.end {
            if let Some((phys, flags)) = space.directory.unmap(addr) {
                if !flags.contains(EntryFlags::ZFOD) {
                    crate::mm::frame_allocator::free_user_frame(phys);
                }
            }
            addr += PAGE_SIZE as u32;
        }
    }
    for kvaddr in space.directory.shadow_addrs() {
        crate::mm::kvm::free_page(kvaddr);
    }
    // The second-level page-table frames `ensure_table` allocated are not
    // individually walked and freed, a deliberate simplification over a
    // full page-table walk (see DESIGN.md).
    unsafe { crate::mm::frame_allocator::free_frame(space.directory.phys) };
}
