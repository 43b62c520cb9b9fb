//! Console syscalls: `print`, `getchar`, `set_term_color`, `set_cursor_pos`,
//! `get_cursor_pos` (spec §4.13).

use alloc::vec;

use crate::{
    drivers::{console, keyboard},
    error::Result,
    mm::copy,
    syscall::Ureg,
};

pub fn sys_print(ureg: &Ureg) -> Result<i32> {
    let len = ureg.ebx as usize;
    if len == 0 {
        return Ok(0);
    }
    let mut buf = vec![0u8; len];
    copy::copy_from_user(&mut buf, ureg.ecx)?;
    console::print(&buf);
    Ok(len as i32)
}

/// One committed byte, or `-1` if none is available right now. Unlike
/// `readline`, `getchar` never blocks.
pub fn sys_getchar() -> i32 {
    let mut byte = [0u8; 1];
    match keyboard::readline(&mut byte) {
        Ok(1) => byte[0] as i32,
        _ => -1,
    }
}

pub fn sys_set_term_color(ureg: &Ureg) -> Result<i32> {
    console::set_term_color(ureg.ebx as u8)?;
    Ok(0)
}

pub fn sys_set_cursor_pos(ureg: &Ureg) -> Result<i32> {
    console::set_cursor_pos(ureg.ebx as usize, ureg.ecx as usize)?;
    Ok(0)
}

pub fn sys_get_cursor_pos(ureg: &Ureg) -> Result<i32> {
    let (row, col) = console::get_cursor_pos();
    if ureg.ebx != 0 {
        copy::copy_to_user(ureg.ebx, &(row as u32).to_le_bytes())?;
    }
    if ureg.ecx != 0 {
        copy::copy_to_user(ureg.ecx, &(col as u32).to_le_bytes())?;
    }
    Ok(0)
}
