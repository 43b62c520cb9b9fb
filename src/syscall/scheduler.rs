//! Scheduling syscalls: `yield`, `deschedule`, `make_runnable`, `get_ticks`,
//! `sleep` (spec §4.6).

use crate::{
    error::{KernelError, Result},
    ids::Tid,
    mm::copy,
    sched,
    syscall::Ureg,
};

pub fn sys_yield(ureg: &Ureg) -> Result<i32> {
    let target = match ureg.ebx as i32 {
        -1 => None,
        tid if tid >= 0 => Some(Tid(tid as u32)),
        _ => return Err(KernelError::Args),
    };
    sched::yield_to(target)?;
    Ok(0)
}

/// Reads `*reject` itself, inside the closure `sched::deschedule` runs under
/// its quick-lock, so a concurrent `make_runnable` on another CPU-visible
/// path can't land between the check and the thread leaving the ready
/// queue. A bad pointer is treated as "don't deschedule" rather than
/// faulting mid-quick-lock.
pub fn sys_deschedule(ureg: &Ureg) -> Result<i32> {
    let reject_ptr = ureg.ebx;
    sched::deschedule(|| {
        let mut buf = [0u8; 4];
        match copy::copy_from_user(&mut buf, reject_ptr) {
            Ok(()) => i32::from_le_bytes(buf),
            Err(_) => 0,
        }
    });
    Ok(0)
}

pub fn sys_make_runnable(ureg: &Ureg) -> Result<i32> {
    let tid = Tid(ureg.ebx);
    if !sched::is_descheduled(tid) {
        return Err(KernelError::State);
    }
    sched::make_runnable(tid);
    Ok(0)
}

pub fn sys_get_ticks() -> i32 {
    crate::drivers::timer::ticks() as i32
}

pub fn sys_sleep(ureg: &Ureg) -> Result<i32> {
    let ticks = ureg.ebx as i32;
    if ticks < 0 {
        return Err(KernelError::Args);
    }
    sched::sleep(ticks as u32);
    Ok(0)
}
