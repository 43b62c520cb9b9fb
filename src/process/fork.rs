//! `fork`: duplicate the calling task into a brand new task with its own
//! pid, address space, and single thread, which resumes as if `fork` had
//! just returned 0 (spec §4.9).

use alloc::sync::Arc;
use core::mem::size_of;

use crate::{
    arch::x86::trampolines,
    error::{KernelError, Result},
    ids::Pid,
    process::{self, pcb::Pcb, tcb::Tcb},
    syscall::Ureg,
};

/// `ureg` is the trap frame the calling thread trapped into the kernel
/// with; the child's kernel stack is primed with a copy of it (`eax`
/// forced to 0) so the child's first action, the moment it's scheduled, is
/// to fall out of the very same trap it never actually took.
pub fn fork_current(ureg: &Ureg) -> Result<Pid> {
    let parent_pcb = process::current_pcb();
    if parent_pcb.thread_count.load(core::sync::atomic::Ordering::Acquire) != 1 {
        // A multi-threaded task forking would need to freeze every sibling
        // thread before copying the address space; out of scope here, same
        // as the single-threaded `exec` restriction.
        return Err(KernelError::MulThr);
    }

    let mut space_slot = parent_pcb.address_space.lock();
    let parent_space = space_slot.as_mut().ok_or(KernelError::Fail)?;
    let child_space = parent_space.duplicate()?;
    drop(space_slot);

    let child_tid = crate::ids::next_tid();
    let program_name = parent_pcb.program_name.lock().clone();
    let child_pcb = Arc::new(Pcb::new(Some(parent_pcb.pid), program_name, child_tid));
    child_pcb.set_dir_phys(child_space.directory.phys);
    *child_pcb.address_space.lock() = Some(child_space);
    process::table::register_pcb(child_pcb.clone());
    parent_pcb.add_child(child_pcb.pid);

    let child_pid = child_pcb.pid;
    let child_tcb = process::spawn_thread(child_pcb, child_tid);
    prime_fork_child(&child_tcb, ureg);
    crate::sched::enqueue_new_thread(child_tcb.tid);

    Ok(child_pid)
}

/// Lay out `child`'s kernel stack with a copy of `parent_ureg` (`eax`
/// zeroed) and a saved esp that resumes into [`fork_child_trampoline`].
pub fn prime_fork_child(child: &Arc<Tcb>, parent_ureg: &Ureg) {
    let mut child_ureg = *parent_ureg;
    child_ureg.eax = 0;

    let ureg_addr = child.kstack_top - size_of::<Ureg>() as u32;
    unsafe { core::ptr::write(ureg_addr as *mut Ureg, child_ureg) };
    child.resume_trap_frame.store(ureg_addr, core::sync::atomic::Ordering::Release);

    let esp = unsafe { trampolines::prepare_new_thread_stack(ureg_addr, fork_child_trampoline) };
    child.set_initial_esp(esp);
}

extern "C" fn fork_child_trampoline() -> ! {
    let tcb = process::current_tcb();
    let ureg_addr = tcb.resume_trap_frame.load(core::sync::atomic::Ordering::Acquire);
    unsafe { trampolines::resume_trap_frame(ureg_addr as *const u8) }
}
