//! Console: linear character/attribute buffer, cursor, single-writer
//! invariant (spec §4.13).
//!
//! The actual VGA cell write and CRTC cursor-position I/O port sequence are
//! external collaborators (spec §1); this module owns cursor state, the
//! print-serializing lock, and argument validation, and calls through
//! [`cell::write`] / [`cell::set_hw_cursor`] for the hardware-facing half.

use spin::Mutex;

use crate::{
    config::{CONSOLE_HEIGHT, CONSOLE_WIDTH},
    error::{KernelError, Result},
};

const CELLS: usize = CONSOLE_WIDTH * CONSOLE_HEIGHT;
const DEFAULT_COLOR: u8 = 0x07; // light grey on black

struct ConsoleState {
    /// Shadow copy of every cell, kept so scrolling can be computed in
    /// Rust instead of re-reading video memory.
    cells: [(u8, u8); CELLS],
    row: usize,
    col: usize,
    color: u8,
    cursor_hidden: bool,
}

impl ConsoleState {
    const fn new() -> Self {
        Self {
            cells: [(b' ', DEFAULT_COLOR); CELLS],
            row: 0,
            col: 0,
            color: DEFAULT_COLOR,
            cursor_hidden: false,
        }
    }

    fn put_cell(&mut self, row: usize, col: usize, ch: u8) {
        let offset = row * CONSOLE_WIDTH + col;
        self.cells[offset] = (ch, self.color);
        cell::write(offset, ch, self.color);
    }

    fn advance(&mut self) {
        self.col += 1;
        if self.col >= CONSOLE_WIDTH {
            self.col = 0;
            self.newline();
        }
    }

    fn newline(&mut self) {
        self.col = 0;
        if self.row + 1 >= CONSOLE_HEIGHT {
            self.scroll();
        } else {
            self.row += 1;
        }
    }

    fn scroll(&mut self) {
        for row in 1..CONSOLE_HEIGHT {
            for col in 0..CONSOLE_WIDTH {
                let cell = self.cells[row * CONSOLE_WIDTH + col];
                self.cells[(row - 1) * CONSOLE_WIDTH + col] = cell;
                cell::write((row - 1) * CONSOLE_WIDTH + col, cell.0, cell.1);
            }
        }
        let blank_row = CONSOLE_HEIGHT - 1;
        for col in 0..CONSOLE_WIDTH {
            self.put_cell(blank_row, col, b' ');
        }
    }

    fn putc(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            0x08 => {
                // Backspace: erase the previous cell in place. Line-editing
                // semantics (stopping at a committed boundary) live in
                // `drivers::keyboard`, not here.
                if self.col > 0 {
                    self.col -= 1;
                    self.put_cell(self.row, self.col, b' ');
                } else if self.row > 0 {
                    self.row -= 1;
                    self.col = CONSOLE_WIDTH - 1;
                    self.put_cell(self.row, self.col, b' ');
                }
            }
            byte => {
                self.put_cell(self.row, self.col, byte);
                self.advance();
            }
        }
        self.sync_cursor();
    }

    fn sync_cursor(&self) {
        if self.cursor_hidden {
            return;
        }
        cell::set_hw_cursor((self.row * CONSOLE_WIDTH + self.col) as u16);
    }
}

static CONSOLE: Mutex<ConsoleState> = Mutex::new(ConsoleState::new());

pub fn init() {}

/// Print bytes to the console, serialized against concurrent writers.
pub fn print(bytes: &[u8]) {
    let mut state = CONSOLE.lock();
    for &byte in bytes {
        state.putc(byte);
    }
}

/// Set the foreground/background colour for subsequent writes.
///
/// `color` packs the standard VGA attribute byte (low nibble foreground,
/// high nibble background); invalid combinations (blink bit misused as an
/// 16th background colour) are rejected.
pub fn set_term_color(color: u8) -> Result<()> {
    if color & 0x80 != 0 {
        return Err(KernelError::Args);
    }
    CONSOLE.lock().color = color;
    Ok(())
}

pub fn get_term_color() -> u8 {
    CONSOLE.lock().color
}

/// Move the cursor to `(row, col)`. Returns `Args` without side effects if
/// out of bounds.
pub fn set_cursor_pos(row: usize, col: usize) -> Result<()> {
    if row >= CONSOLE_HEIGHT || col >= CONSOLE_WIDTH {
        return Err(KernelError::Args);
    }
    let mut state = CONSOLE.lock();
    state.row = row;
    state.col = col;
    state.sync_cursor();
    Ok(())
}

pub fn get_cursor_pos() -> (usize, usize) {
    let state = CONSOLE.lock();
    (state.row, state.col)
}

pub fn set_cursor_hidden(hidden: bool) {
    let mut state = CONSOLE.lock();
    state.cursor_hidden = hidden;
    if hidden {
        cell::hide_hw_cursor();
    } else {
        state.sync_cursor();
    }
}

/// Hardware-facing half: VGA text-mode cell write and CRTC cursor I/O port
/// sequence. Named as an external collaborator in spec §1; kept minimal and
/// isolated here rather than threaded through the logic above. Host unit
/// tests exercise the cursor/color bookkeeping above without a mapped VGA
/// buffer or I/O ports, so the actual hardware access is `cfg(not(test))`.
mod cell {
    #[cfg(not(test))]
    use crate::arch::x86::port;

    #[cfg(not(test))]
    const VGA_BUFFER: usize = 0xB8000;
    #[cfg(not(test))]
    const CRTC_INDEX: u16 = 0x3D4;
    #[cfg(not(test))]
    const CRTC_DATA: u16 = 0x3D5;

    #[cfg(not(test))]
    pub fn write(offset: usize, ch: u8, color: u8) {
        let value = (color as u16) << 8 | ch as u16;
        unsafe {
            core::ptr::write_volatile((VGA_BUFFER as *mut u16).add(offset), value);
        }
    }

    #[cfg(test)]
    pub fn write(_offset: usize, _ch: u8, _color: u8) {}

    #[cfg(not(test))]
    pub fn set_hw_cursor(offset: u16) {
        unsafe {
            port::write_u8(CRTC_INDEX, 0x0F);
            port::write_u8(CRTC_DATA, (offset & 0xFF) as u8);
            port::write_u8(CRTC_INDEX, 0x0E);
            port::write_u8(CRTC_DATA, ((offset >> 8) & 0xFF) as u8);
        }
    }

    #[cfg(test)]
    pub fn set_hw_cursor(_offset: u16) {}

    #[cfg(not(test))]
    pub fn hide_hw_cursor() {
        unsafe {
            port::write_u8(CRTC_INDEX, 0x0A);
            port::write_u8(CRTC_DATA, 0x20);
        }
    }

    #[cfg(test)]
    pub fn hide_hw_cursor() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn rejects_out_of_bounds_cursor() {
        assert_eq!(set_cursor_pos(CONSOLE_HEIGHT, 0), Err(KernelError::Args));
        assert_eq!(set_cursor_pos(0, CONSOLE_WIDTH), Err(KernelError::Args));
    }

    #[test_case]
    fn rejects_invalid_color() {
        assert_eq!(set_term_color(0x80), Err(KernelError::Args));
    }

    #[test_case]
    fn valid_cursor_round_trips() {
        set_cursor_pos(3, 4).unwrap();
        assert_eq!(get_cursor_pos(), (3, 4));
    }
}
