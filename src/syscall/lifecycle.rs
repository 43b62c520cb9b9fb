//! Lifecycle syscalls: `fork`, `thread_fork`, `exec`, `wait`, `set_status`,
//! `gettid` (spec §4.9). `vanish`/`task_vanish` are dispatched directly from
//! [`super::dispatch_syscall`] since they never return through here.

use alloc::{string::String, vec::Vec};
use core::{mem::size_of, sync::atomic::Ordering};

use crate::{
    arch::x86::trampolines,
    config::EXEC_ARG_BUFFER_LIMIT,
    error::{KernelError, Result},
    mm::copy,
    process,
    syscall::Ureg,
};

pub fn sys_fork(ureg: &Ureg) -> Result<i32> {
    process::fork::fork_current(ureg).map(|pid| pid.0 as i32)
}

pub fn sys_thread_fork(ureg: &Ureg) -> Result<i32> {
    process::thread_fork::thread_fork_current(ureg).map(|tid| tid.0 as i32)
}

/// Replaces the calling task's image on success by jumping straight to user
/// mode and never returning; on failure returns normally so the caller can
/// write the error into `ureg.eax`.
pub fn sys_exec(ureg: &mut Ureg) -> Result<()> {
    let name = copy::copy_string_from_user(ureg.ebx, EXEC_ARG_BUFFER_LIMIT)?;
    let argv = copy_argv(ureg.ecx)?;
    let (entry, user_esp) = process::exec::exec_into_current(&name, &argv)?;
    const INITIAL_EFLAGS: u32 = 0x0000_0200;
    unsafe { trampolines::mode_switch_to_user(entry, user_esp, INITIAL_EFLAGS) }
}

/// `argv_ptr` names a NUL-terminated array of NUL-terminated user strings.
fn copy_argv(mut argv_ptr: u32) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    loop {
        let mut word = [0u8; size_of::<u32>()];
        copy::copy_from_user(&mut word, argv_ptr)?;
        let entry = u32::from_le_bytes(word);
        if entry == 0 {
            break;
        }
        argv.push(copy::copy_string_from_user(entry, EXEC_ARG_BUFFER_LIMIT)?);
        argv_ptr += size_of::<u32>() as u32;
        if argv.len() * size_of::<u32>() >= EXEC_ARG_BUFFER_LIMIT {
            return Err(KernelError::Len);
        }
    }
    Ok(argv)
}

pub fn sys_set_status(ureg: &Ureg) -> Result<i32> {
    process::current_pcb()
        .exit_status
        .store(ureg.ebx as i32, Ordering::Release);
    Ok(0)
}

pub fn sys_wait(ureg: &Ureg) -> Result<i32> {
    let (pid, status) = process::wait::wait_for_any_child()?;
    let status_ptr = ureg.ebx;
    if status_ptr != 0 {
        copy::copy_to_user(status_ptr, &status.to_le_bytes())?;
    }
    Ok(pid.0 as i32)
}

/// No locking needed: a thread only ever reads its own identity.
pub fn sys_gettid() -> i32 {
    process::current_tcb().tid.0 as i32
}
