//! `exec`: replace the calling task's image with a freshly loaded
//! executable (spec §4.9). Requires the task be single-threaded; the
//! calling thread's tid and pid are kept, everything else about its
//! address space is discarded and rebuilt.

use alloc::{
    string::String,
    sync::Arc,
    vec::Vec,
};
use core::sync::atomic::Ordering;

use crate::{
    arch::x86::trampolines,
    config::{PAGE_SIZE, USER_STACK_BASE},
    elf::Image,
    error::{KernelError, Result},
    mm::{
        page_table::EntryFlags,
        region::{Region, RegionKind},
        vmm::AddressSpace,
    },
    process::{self, tcb::Tcb},
};

/// Build the fresh address space for an `exec`'d image: map every
/// `PT_LOAD` segment (copying its file bytes, zeroing the rest of its
/// last page), then carve out one ZFOD guard page below the stack top so
/// the stack can grow the same way every other ZFOD region resolves.
pub fn build_address_space(image: &Image, argv: &[String]) -> Result<(AddressSpace, u32)> {
    let mut space = AddressSpace::new(USER_STACK_BASE)?;
    for segment in image.segments()? {
        load_segment(&mut space, image, segment)?;
    }
    let user_esp = push_initial_stack(&mut space, argv)?;
    Ok((space, user_esp))
}

fn load_segment(space: &mut AddressSpace, image: &Image, segment: crate::elf::Segment) -> Result<()> {
    if segment.mem_size == 0 {
        return Ok(());
    }
    let aligned_start = segment.vaddr & !(PAGE_SIZE as u32 - 1);
    let aligned_end = (segment.vaddr + segment.mem_size + PAGE_SIZE as u32 - 1) & !(PAGE_SIZE as u32 - 1);
    space.regions.insert(Region {
        start: aligned_start,
        end: aligned_end,
        writable: segment.writable,
        kind: if segment.writable {
            RegionKind::Data
        } else {
            RegionKind::Text
        },
    })?;

    let mut addr = aligned_start;
    while addr < aligned_end {
        let frame = crate::mm::frame_allocator::alloc_user_frame()?;
        unsafe { core::ptr::write_bytes(crate::mm::page_table::phys_to_kernel_ptr(frame), 0, PAGE_SIZE) };

        let file_bytes = image.file_bytes();
        let page_offset_in_segment = addr.saturating_sub(segment.vaddr);
        if page_offset_in_segment < segment.file_size {
            let page_file_start = (segment.file_offset + page_offset_in_segment) as usize;
            let copy_len = ((segment.file_size - page_offset_in_segment) as usize)
                .min(PAGE_SIZE)
                .min(file_bytes.len().saturating_sub(page_file_start));
            if copy_len > 0 {
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        file_bytes[page_file_start..].as_ptr(),
                        crate::mm::page_table::phys_to_kernel_ptr(frame),
                        copy_len,
                    );
                }
            }
        }

        let mut flags = EntryFlags::PRESENT | EntryFlags::USER;
        if segment.writable {
            flags |= EntryFlags::WRITABLE;
        }
        if let Err(err) = space.directory.map(addr, frame, flags) {
            crate::mm::frame_allocator::free_user_frame(frame);
            // Leaves whatever this and earlier segments already mapped in
            // `space` in place; `build_address_space` reports failure to
            // `exec_into_current`'s caller without installing `space` onto
            // the task, so the task's real, running address space is
            // untouched either way (unlike `fork`'s duplicate, which must
            // unwind the half-built copy itself before it can tell
            // `exec`'s pattern apart from a still-running task).
            return Err(err);
        }
        addr += PAGE_SIZE as u32;
    }
    Ok(())
}

/// Reserve the first stack page and write `argc`/`argv`/`envp` onto it the
/// way the spec's runtime expects to find them at the initial `esp` (spec
/// §4.9 "the standard stack layout"), returning that `esp`.
fn push_initial_stack(space: &mut AddressSpace, argv: &[String]) -> Result<u32> {
    let stack_low = USER_STACK_BASE - PAGE_SIZE as u32;
    space.regions.insert(Region {
        start: stack_low,
        end: USER_STACK_BASE,
        writable: true,
        kind: RegionKind::Stack,
    })?;
    let frame = crate::mm::frame_allocator::alloc_user_frame()?;
    let page_ptr = unsafe { crate::mm::page_table::phys_to_kernel_ptr(frame) };
    unsafe { core::ptr::write_bytes(page_ptr, 0, PAGE_SIZE) };
    if let Err(err) = space
        .directory
        .map(stack_low, frame, EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER)
    {
        crate::mm::frame_allocator::free_user_frame(frame);
        return Err(err);
    }
    space.stack_low = stack_low;

    // Lay out argv strings at the top of the page, then a NUL-terminated
    // argv pointer array below them, both written through the kernel's
    // direct map of the frame we just mapped at `stack_low`.
    let mut string_cursor = PAGE_SIZE as u32;
    let mut string_offsets = Vec::with_capacity(argv.len());
    for arg in argv.iter().rev() {
        let bytes = arg.as_bytes();
        string_cursor -= bytes.len() as u32 + 1;
        let dst = unsafe { page_ptr.add(string_cursor as usize) };
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            core::ptr::write(dst.add(bytes.len()), 0u8);
        }
        string_offsets.push(stack_low + string_cursor);
    }
    string_offsets.reverse();

    let pointer_bytes = ((argv.len() as u32 + 1) * 4).max(4);
    let mut array_cursor = string_cursor - pointer_bytes;
    array_cursor &= !0x3; // keep the pointer array word-aligned
    let argv_base = stack_low + array_cursor;
    for (i, &addr) in string_offsets.iter().enumerate() {
        unsafe {
            core::ptr::write((page_ptr.add(array_cursor as usize) as *mut u32).add(i), addr);
        }
    }
    unsafe {
        core::ptr::write(
            (page_ptr.add(array_cursor as usize) as *mut u32).add(string_offsets.len()),
            0,
        );
    }

    // Final esp: argc, argv, then the pointer array itself, 16-byte aligned
    // the way the teacher's calling convention expects a fresh stack to be.
    let mut esp_cursor = array_cursor - 12;
    esp_cursor &= !0xF;
    unsafe {
        let esp_ptr = page_ptr.add(esp_cursor as usize) as *mut u32;
        core::ptr::write(esp_ptr, argv.len() as u32);
        core::ptr::write(esp_ptr.add(1), argv_base);
    }
    Ok(stack_low + esp_cursor)
}

/// Lay out `tcb`'s kernel stack so the first time the scheduler switches to
/// it, execution resumes in [`user_entry_trampoline`], dropping straight
/// into user mode at `entry` with stack `user_esp`.
pub fn prime_entry(tcb: &Arc<Tcb>, entry: u32, user_esp: u32) {
    tcb.initial_entry.store(entry, Ordering::Release);
    tcb.initial_user_esp.store(user_esp, Ordering::Release);
    let esp = unsafe { trampolines::prepare_new_thread_stack(tcb.kstack_top, user_entry_trampoline) };
    tcb.set_initial_esp(esp);
}

extern "C" fn user_entry_trampoline() -> ! {
    let tcb = process::current_tcb();
    let entry = tcb.initial_entry.load(Ordering::Acquire);
    let user_esp = tcb.initial_user_esp.load(Ordering::Acquire);
    const INITIAL_EFLAGS: u32 = 0x0000_0200; // IF set, everything else clear
    unsafe { trampolines::mode_switch_to_user(entry, user_esp, INITIAL_EFLAGS) }
}

/// The syscall entry point: parse `name`/`argv` already copied out of user
/// space, look the binary up in the ROM executable table, build its
/// address space, and splice it into the calling (single-threaded) task.
/// Returns the `(entry, user_esp)` the caller must `mode_switch_to_user`
/// into directly; unlike every other syscall, `exec` never returns to the
/// instruction after the trap since the code it trapped from no longer
/// exists in the new address space.
pub fn exec_into_current(name: &str, argv: &[String]) -> Result<(u32, u32)> {
    let pcb = process::current_pcb();
    if pcb.thread_count.load(Ordering::Acquire) != 1 {
        return Err(KernelError::MulThr);
    }
    let entry = crate::boot::lookup_executable(name).ok_or(KernelError::Name)?;
    let image = Image::parse(entry.bytes)?;
    let (space, user_esp) = build_address_space(&image, argv)?;

    *pcb.program_name.lock() = String::from(name);
    pcb.set_dir_phys(space.directory.phys);
    let new_dir_phys = space.directory.phys;
    *pcb.address_space.lock() = Some(space);

    let tcb = process::current_tcb();
    tcb.dir_phys.store(new_dir_phys, Ordering::Release);
    // Take effect now: this thread is running on the directory being
    // replaced, not one the scheduler is about to switch into.
    unsafe { crate::arch::x86::load_cr3(new_dir_phys) };
    tcb.initial_entry.store(image.entry(), Ordering::Release);
    tcb.initial_user_esp.store(user_esp, Ordering::Release);
    Ok((image.entry(), user_esp))
}
