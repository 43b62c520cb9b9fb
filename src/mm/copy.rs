//! Safe user/kernel copy (spec §4.5): every syscall argument that's a
//! pointer goes through here rather than being dereferenced directly, so a
//! bad user pointer becomes a `KernelError::Buf` instead of a kernel page
//! fault.

use alloc::{string::String, vec::Vec};

use crate::{
    config::PAGE_SIZE,
    error::{KernelError, Result},
    mm::page_table::EntryFlags,
    process,
};

/// Checks that `[addr, addr+len)` falls entirely within one region owned by
/// the current task, resolving any ZFOD pages it crosses so the subsequent
/// raw copy can't fault. Returns an error without copying anything on any
/// violation.
fn validate_range(addr: u32, len: usize, want_write: bool) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let end = addr.checked_add(len as u32).ok_or(KernelError::Buf)?;
    let pcb = process::current_pcb();
    let mut space = pcb.address_space.lock();
    let space = space.as_mut().ok_or(KernelError::Buf)?;

    let region = space.regions.find(addr).ok_or(KernelError::Buf)?;
    if end > region.end || !region.contains(addr) {
        return Err(KernelError::Buf);
    }
    if want_write && !region.writable {
        return Err(KernelError::Buf);
    }

    let mut page = addr & !(PAGE_SIZE as u32 - 1);
    while page < end {
        if want_write {
            match space.directory.translate(page) {
                Some((_, flags)) if flags.contains(EntryFlags::ZFOD) => {
                    space.directory.resolve_zfod(page)?;
                }
                Some(_) => {}
                None => return Err(KernelError::Buf),
            }
        } else if space.directory.translate(page).is_none() {
            return Err(KernelError::Buf);
        }
        page += PAGE_SIZE as u32;
    }
    Ok(())
}

pub fn copy_from_user(dst: &mut [u8], user_addr: u32) -> Result<()> {
    validate_range(user_addr, dst.len(), false)?;
    unsafe {
        core::ptr::copy_nonoverlapping(user_addr as *const u8, dst.as_mut_ptr(), dst.len());
    }
    Ok(())
}

pub fn copy_to_user(user_addr: u32, src: &[u8]) -> Result<()> {
    validate_range(user_addr, src.len(), true)?;
    unsafe {
        core::ptr::copy_nonoverlapping(src.as_ptr(), user_addr as *mut u8, src.len());
    }
    Ok(())
}

/// Copy a NUL-terminated string from user space, rejecting anything longer
/// than `max_len` bytes excluding the terminator (spec's bounded-copy
/// requirement for `exec`'s `name`/`argv`).
pub fn copy_string_from_user(user_addr: u32, max_len: usize) -> Result<String> {
    let mut bytes = Vec::new();
    let mut addr = user_addr;
    loop {
        if bytes.len() >= max_len {
            return Err(KernelError::Len);
        }
        let mut byte = [0u8; 1];
        copy_from_user(&mut byte, addr)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
        addr += 1;
    }
    String::from_utf8(bytes).map_err(|_| KernelError::Args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn rejects_zero_length_as_trivially_ok() {
        assert!(validate_range(0x2000_0000, 0, true).is_ok());
    }
}
