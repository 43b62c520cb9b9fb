//! `ls`, `halt`, `misbehave` (spec §6 "Persistent state layout").

use crate::{
    arch,
    boot,
    error::{KernelError, Result},
    mm::copy,
    syscall::Ureg,
};

/// Copies out NUL-separated executable names from the boot ROM table.
/// Returns the count of names written, or `Buf`/`Len` if `buf` is too small
/// to hold them all.
pub fn sys_ls(ureg: &Ureg) -> Result<i32> {
    let buf_ptr = ureg.ebx;
    let len = ureg.ecx as usize;

    let names = boot::executable_names();
    let mut out = alloc::vec::Vec::new();
    for name in &names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    if out.len() > len {
        return Err(KernelError::Len);
    }
    copy::copy_to_user(buf_ptr, &out)?;
    Ok(names.len() as i32)
}

pub fn sys_halt() -> Result<i32> {
    loop {
        arch::halt();
    }
}

/// Scheduler-variance testing hook in the reference kernel; kept for ABI
/// completeness but has no effect here.
pub fn sys_misbehave(_ureg: &Ureg) -> Result<i32> {
    Ok(0)
}
