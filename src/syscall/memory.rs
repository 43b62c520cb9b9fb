//! `new_pages`/`remove_pages` (spec §4.4).

use crate::{
    error::{KernelError, Result},
    process,
    syscall::Ureg,
};

pub fn sys_new_pages(ureg: &Ureg) -> Result<i32> {
    let pcb = process::current_pcb();
    let mut guard = pcb.address_space.lock();
    let space = guard.as_mut().ok_or(KernelError::Fail)?;
    space.new_pages(ureg.ebx, ureg.ecx)?;
    Ok(0)
}

/// `remove_pages(base)` requires an exact `start == base` match on a
/// `new_pages`-created region; the length isn't part of the syscall
/// argument, it's recovered from the region the kernel already tracks.
pub fn sys_remove_pages(ureg: &Ureg) -> Result<i32> {
    let base = ureg.ebx;
    let pcb = process::current_pcb();
    let mut guard = pcb.address_space.lock();
    let space = guard.as_mut().ok_or(KernelError::Fail)?;
    let len = space
        .regions
        .iter()
        .find(|region| region.start == base)
        .map(|region| region.end - region.start)
        .ok_or(KernelError::Args)?;
    space.remove_pages(base, len)?;
    Ok(0)
}
