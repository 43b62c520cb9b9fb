//! `readline` (spec §4.11): blocks until a full committed line is
//! available, then copies up to `len` bytes of it out to the caller.

use alloc::vec;

use crate::{
    drivers::keyboard,
    error::{KernelError, Result},
    mm::copy,
    syscall::Ureg,
};

pub fn sys_readline(ureg: &Ureg) -> Result<i32> {
    let len = ureg.ebx as usize;
    let buf_ptr = ureg.ecx;
    if len == 0 {
        return Err(KernelError::Len);
    }
    let mut line = vec![0u8; len];
    loop {
        let n = keyboard::readline(&mut line)?;
        if n > 0 {
            copy::copy_to_user(buf_ptr, &line[..n])?;
            return Ok(n as i32);
        }
        keyboard::LINE_READY.wait();
    }
}
