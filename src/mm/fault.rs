//! User page-fault dispatch (spec §4.4): offered first to the faulting
//! thread's installed software-exception handler, then classified against
//! the task's region list, and killed otherwise.

use crate::{
    config::PAGE_SIZE,
    error::FAULT_EXIT_STATUS,
    mm::region::{classify_fault, FaultOutcome},
    process,
    syscall::{swexn, Ureg},
};

/// Called from [`crate::syscall::dispatch_syscall`] for `VECTOR_PAGE_FAULT`.
/// Never returns if the fault is illegal and the task has no handler; the
/// calling thread's task vanishes instead.
pub fn handle(ureg: &mut Ureg) {
    let fault_addr = unsafe { crate::arch::x86::read_cr2() };
    let tcb = process::current_tcb();

    if swexn::deliver(&tcb, ureg) {
        return;
    }

    let pcb = process::current_pcb();
    let mut space_guard = pcb.address_space.lock();
    let Some(space) = space_guard.as_mut() else {
        drop(space_guard);
        process::vanish::task_vanish(FAULT_EXIT_STATUS);
    };

    match classify_fault(&space.regions, fault_addr, space.stack_low) {
        FaultOutcome::ZfodResolved => {
            let page = fault_addr & !(PAGE_SIZE as u32 - 1);
            if space.directory.resolve_zfod(page).is_err() {
                drop(space_guard);
                process::vanish::task_vanish(FAULT_EXIT_STATUS);
            }
        }
        FaultOutcome::StackGrown => {
            let page = fault_addr & !(PAGE_SIZE as u32 - 1);
            let frame = match crate::mm::frame_allocator::alloc_user_frame() {
                Ok(frame) => frame,
                Err(_) => {
                    drop(space_guard);
                    process::vanish::task_vanish(FAULT_EXIT_STATUS);
                }
            };
            unsafe {
                core::ptr::write_bytes(crate::mm::page_table::phys_to_kernel_ptr(frame), 0, PAGE_SIZE);
            }
            let mapped = space.directory.map(
                page,
                frame,
                crate::mm::page_table::EntryFlags::PRESENT
                    | crate::mm::page_table::EntryFlags::WRITABLE
                    | crate::mm::page_table::EntryFlags::USER,
            );
            if mapped.is_err() {
                crate::mm::frame_allocator::free_user_frame(frame);
                drop(space_guard);
                process::vanish::task_vanish(FAULT_EXIT_STATUS);
            }
            space.stack_low = page;
            space.regions.extend_stack_down(page);
        }
        FaultOutcome::Illegal => {
            drop(space_guard);
            process::vanish::task_vanish(FAULT_EXIT_STATUS);
        }
    }
}
