//! Interrupt descriptor table: one gate per CPU exception, the two legacy
//! IRQs this kernel cares about (timer, keyboard), and the syscall gate.

use spin::Once;
use x86::dtables::DescriptorTablePointer;

use super::{gdt::KERNEL_CODE_SELECTOR, trampolines::trap_entry};

pub const VECTOR_PAGE_FAULT: u8 = 14;
pub const VECTOR_TIMER: u8 = 32;
pub const VECTOR_KEYBOARD: u8 = 33;
pub const VECTOR_SYSCALL: u8 = 0x80;

const IDT_ENTRIES: usize = 256;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

/// Present, ring-0-callable (DPL=3 so `int 0x80` works from user mode),
/// 32-bit interrupt gate.
const GATE_INTERRUPT: u8 = 0b1000_1110;
const GATE_TRAP_USER: u8 = 0b1110_1111;

static mut IDT: [IdtEntry; IDT_ENTRIES] = [IdtEntry::missing(); IDT_ENTRIES];

static INIT: Once<()> = Once::new();

/// Install every gate and load `idtr`.
///
/// Every vector shares the single [`trap_entry`] trampoline; it is
/// `trap_entry`'s job (in assembly, outside this crate) to push the vector
/// number as part of the raw frame so [`crate::syscall::dispatch_syscall`]
/// can distinguish faults, IRQs, and the syscall gate.
pub fn init() {
    INIT.call_once(|| unsafe {
        let handler = trap_entry as usize as u32;
        for (vector, entry) in IDT.iter_mut().enumerate() {
            let gate = if vector as u8 == VECTOR_SYSCALL {
                GATE_TRAP_USER
            } else {
                GATE_INTERRUPT
            };
            *entry = IdtEntry::new(handler, KERNEL_CODE_SELECTOR, gate);
        }

        let ptr = DescriptorTablePointer::new_from_slice(&*core::ptr::addr_of!(IDT));
        x86::dtables::lidt(&ptr);
    });
}
