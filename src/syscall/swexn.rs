//! Software exception registration and delivery (spec §4.10).

use alloc::sync::Arc;
use core::{mem::size_of, sync::atomic::Ordering};

use crate::{
    config::PAGE_SIZE,
    error::{KernelError, Result},
    mm::{copy, page_table::EntryFlags},
    process::{self, tcb::{SwexnHandler, Tcb}},
    syscall::Ureg,
};

/// Only these `EFLAGS` bits may differ between the saved frame and a
/// `newureg` replacement: the condition-code and direction-flag bits a user
/// program can legitimately twiddle. `IF`, `IOPL`, `VM`, `NT`, `RF` and the
/// reserved bits are not among them.
const USER_MODIFIABLE_EFLAGS: u32 = 0x0000_0CD5; // CF PF AF ZF SF TF DF OF

pub fn sys_swexn(ureg: &mut Ureg) -> Result<i32> {
    let esp3 = ureg.ebx;
    let eip = ureg.ecx;
    let arg = ureg.edx;
    let newureg_ptr = ureg.esi;

    let tcb = process::current_tcb();

    if esp3 == 0 || eip == 0 {
        *tcb.handler.lock() = None;
        tcb.swexn_stack_claimed.store(false, Ordering::Release);
        return Ok(0);
    }

    validate_user_addr(esp3)?;
    validate_user_addr(eip)?;

    let mut replacement = None;
    if newureg_ptr != 0 {
        let mut bytes = [0u8; size_of::<Ureg>()];
        copy::copy_from_user(&mut bytes, newureg_ptr)?;
        let candidate: Ureg = unsafe { core::ptr::read(bytes.as_ptr() as *const Ureg) };
        if candidate.cs != ureg.cs || candidate.ss != ureg.ss {
            return Err(KernelError::Args);
        }
        if (candidate.eflags ^ ureg.eflags) & !USER_MODIFIABLE_EFLAGS != 0 {
            return Err(KernelError::Args);
        }
        replacement = Some(candidate);
    }

    // Registration and the `newureg` overwrite take effect together: every
    // validation above has already happened, so nothing left can fail.
    *tcb.handler.lock() = Some(SwexnHandler { esp3, eip, arg });
    tcb.swexn_stack_claimed.store(false, Ordering::Release);
    if let Some(frame) = replacement {
        *ureg = frame;
    }
    Ok(0)
}

/// The exception stack is an ordinary user page and may still be
/// zero-filled-on-write; writing the synthetic frame onto it directly would
/// fault against the shared zero frame otherwise.
fn resolve_writable(addr: u32) -> Result<()> {
    let pcb = process::current_pcb();
    let guard = pcb.address_space.lock();
    let Some(space) = guard.as_ref() else { return Ok(()) };
    let page = addr & !(PAGE_SIZE as u32 - 1);
    if let Some((_, flags)) = space.directory.translate(page) {
        if flags.contains(EntryFlags::ZFOD) {
            space.directory.resolve_zfod(page)?;
        }
    }
    Ok(())
}

fn validate_user_addr(addr: u32) -> Result<()> {
    let pcb = process::current_pcb();
    let guard = pcb.address_space.lock();
    let space = guard.as_ref().ok_or(KernelError::Buf)?;
    space.regions.find(addr).map(|_| ()).ok_or(KernelError::Buf)
}

/// Offer a fault to `tcb`'s installed handler. Returns `true` if delivery
/// succeeded (`ureg` now points at the handler's synthetic call frame and
/// the caller should simply resume), `false` if there is no handler or its
/// exception stack is already in use, in which case the fault falls
/// through to ordinary region-based handling.
pub fn deliver(tcb: &Arc<Tcb>, ureg: &mut Ureg) -> bool {
    let Some(handler) = tcb.handler.lock().take() else {
        return false;
    };
    if tcb.swexn_stack_claimed.swap(true, Ordering::AcqRel) {
        return false;
    }

    let ureg_addr = handler.esp3 - size_of::<Ureg>() as u32;
    let frame_esp = ureg_addr - 3 * size_of::<u32>() as u32;
    if resolve_writable(frame_esp).is_err() || resolve_writable(ureg_addr).is_err() {
        // Out of memory resolving the handler's own stack: delivery fails,
        // the fault falls through to ordinary region-based handling instead
        // of writing a synthetic frame onto a page that was never made
        // writable.
        tcb.swexn_stack_claimed.store(false, Ordering::Release);
        return false;
    }

    unsafe { core::ptr::write(ureg_addr as *mut Ureg, *ureg) };
    unsafe {
        let slot = frame_esp as *mut u32;
        core::ptr::write(slot, 0); // fake return address, never used
        core::ptr::write(slot.add(1), handler.arg);
        core::ptr::write(slot.add(2), ureg_addr);
    }

    ureg.eip = handler.eip;
    ureg.esp = frame_esp;
    true
}
