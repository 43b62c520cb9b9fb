//! Keyboard line input: scancode ring buffer with a committed/uncommitted
//! divider, echo staged through a second ring and drained by a reader
//! thread (spec §4.11).

use alloc::{vec, vec::Vec};

use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::{
    config::KEYBOARD_BUFFER_SIZE,
    error::{KernelError, Result},
    sync::{condvar::KCondvar, mutex::KMutex},
};

/// Power-of-two ring buffer of committed/uncommitted input bytes.
struct LineRing {
    buf: Vec<u8>,
    /// Index of the next byte to be consumed by `readline`.
    head: usize,
    /// Index one past the last committed byte; `[head, divider)` is
    /// readable, `[divider, tail)` is still erasable by backspace.
    divider: usize,
    /// Index one past the last byte written by the IRQ handler.
    tail: usize,
}

impl LineRing {
    const MASK: usize = KEYBOARD_BUFFER_SIZE - 1;

    const fn new() -> Self {
        Self {
            buf: Vec::new(),
            head: 0,
            divider: 0,
            tail: 0,
        }
    }

    fn ensure_capacity(&mut self) {
        if self.buf.is_empty() {
            self.buf = vec![0; KEYBOARD_BUFFER_SIZE];
        }
    }

    fn push_char(&mut self, ch: u8) {
        self.ensure_capacity();
        if self.tail.wrapping_sub(self.head) >= KEYBOARD_BUFFER_SIZE {
            return; // buffer full, drop the keystroke
        }
        self.buf[self.tail & Self::MASK] = ch;
        self.tail = self.tail.wrapping_add(1);
        if ch == b'\n' {
            self.divider = self.tail;
        }
    }

    /// Backspace pops only up to the divider (spec §4.11).
    fn backspace(&mut self) -> bool {
        if self.tail > self.divider {
            self.tail = self.tail.wrapping_sub(1);
            true
        } else {
            false
        }
    }

    fn committed_len(&self) -> usize {
        self.divider.wrapping_sub(self.head)
    }

    fn pop_committed(&mut self, out: &mut [u8]) -> usize {
        let available = self.committed_len();
        let n = available.min(out.len());
        for (i, slot) in out.iter_mut().enumerate().take(n) {
            *slot = self.buf[(self.head + i) & Self::MASK];
        }
        self.head = self.head.wrapping_add(n);
        n
    }
}

struct EchoRing {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
}

impl EchoRing {
    const MASK: usize = KEYBOARD_BUFFER_SIZE - 1;

    const fn new() -> Self {
        Self {
            buf: Vec::new(),
            head: 0,
            tail: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.buf.is_empty() {
            self.buf = vec![0; KEYBOARD_BUFFER_SIZE];
        }
        if self.tail.wrapping_sub(self.head) >= KEYBOARD_BUFFER_SIZE {
            return;
        }
        self.buf[self.tail & Self::MASK] = byte;
        self.tail = self.tail.wrapping_add(1);
    }

    fn drain_to(&mut self, out: &mut Vec<u8>) {
        while self.head != self.tail {
            out.push(self.buf[self.head & Self::MASK]);
            self.head = self.head.wrapping_add(1);
        }
    }
}

static LINE_RING: Mutex<LineRing> = Mutex::new(LineRing::new());
static ECHO_RING: Mutex<EchoRing> = Mutex::new(EchoRing::new());
static DECODER: Mutex<Option<Keyboard<layouts::Us104Key, ScancodeSet1>>> = Mutex::new(None);

/// Signaled whenever a newline commits a line, so `readline`'s syscall
/// wrapper can block instead of busy-polling.
pub static LINE_READY: KCondvar = KCondvar::new();

lazy_static::lazy_static! {
    /// Serializes concurrent `readline` callers; readline itself is the
    /// only consumer of `LINE_RING`'s committed region, but a second
    /// reader must queue rather than race the first.
    static ref READLINE_LOCK: KMutex<()> = KMutex::new(());
}

pub fn init() {
    *DECODER.lock() = Some(Keyboard::new(
        ScancodeSet1::new(),
        layouts::Us104Key,
        HandleControl::Ignore,
    ));
}

/// Called from the keyboard IRQ handler with a raw scancode byte.
pub fn on_scancode(scancode: u8) {
    let mut decoder_slot = DECODER.lock();
    let Some(decoder) = decoder_slot.as_mut() else {
        return;
    };
    let Ok(Some(event)) = decoder.add_byte(scancode) else {
        return;
    };
    let Some(key) = decoder.process_keyevent(event) else {
        return;
    };

    match key {
        DecodedKey::Unicode(ch) if ch == '\u{8}' => {
            if LINE_RING.lock().backspace() {
                ECHO_RING.lock().push(0x08);
            }
        }
        DecodedKey::Unicode(ch) => {
            let mut buf = [0u8; 4];
            let mut committed = false;
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                LINE_RING.lock().push_char(*byte);
                ECHO_RING.lock().push(*byte);
                committed |= *byte == b'\n';
            }
            if committed {
                LINE_READY.signal();
            }
        }
        DecodedKey::RawKey(_) => {}
    }
}

/// Drain staged echo bytes and print them, stopping after a newline. Run
/// from a dedicated reader thread, never from the IRQ handler itself, so
/// `crate::drivers::console::print`'s lock is never taken at interrupt
/// level.
pub fn pump_echo() {
    let mut staged = Vec::new();
    ECHO_RING.lock().drain_to(&mut staged);
    if staged.is_empty() {
        return;
    }
    if let Some(newline_at) = staged.iter().position(|&b| b == b'\n') {
        crate::drivers::console::print(&staged[..=newline_at]);
    } else {
        crate::drivers::console::print(&staged);
    }
}

/// Read up to `len` committed bytes (including the trailing `\n`) into
/// `out`. Blocks the caller logically (via `READLINE_LOCK`) until another
/// reader isn't mid-read; actual waiting for input to arrive is done by
/// the caller re-polling from `syscall::keyboard::readline`.
pub fn readline(out: &mut [u8]) -> Result<usize> {
    if out.is_empty() {
        return Err(KernelError::Len);
    }
    let _guard = READLINE_LOCK.lock();
    let mut ring = LINE_RING.lock();
    if ring.committed_len() == 0 {
        return Ok(0);
    }
    Ok(ring.pop_committed(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn backspace_stops_at_divider() {
        let mut ring = LineRing::new();
        ring.push_char(b'a');
        ring.push_char(b'b');
        ring.push_char(b'\n'); // commits "ab\n"
        ring.push_char(b'c');
        ring.push_char(b'd');
        assert!(ring.backspace());
        assert!(ring.backspace());
        assert!(!ring.backspace(), "must not erase past the divider");

        let mut out = [0u8; 10];
        let n = ring.pop_committed(&mut out);
        assert_eq!(&out[..n], b"ab\n");
    }

    #[test_case]
    fn scenario_type_ab_backspace_backspace_cd_newline() {
        // "ab\b\bcd\n" -> readline returns "cd\n" (spec §8 scenario 3).
        let mut ring = LineRing::new();
        for &ch in b"ab" {
            ring.push_char(ch);
        }
        ring.backspace();
        ring.backspace();
        for &ch in b"cd\n" {
            ring.push_char(ch);
        }

        let mut out = [0u8; 10];
        let n = ring.pop_committed(&mut out);
        assert_eq!(&out[..n], b"cd\n");
    }

    #[test_case]
    fn readline_returns_zero_when_nothing_committed() {
        let mut ring = LineRing::new();
        ring.push_char(b'x');
        assert_eq!(ring.committed_len(), 0);
    }
}
