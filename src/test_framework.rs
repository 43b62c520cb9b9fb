//! Bare-metal test harness: the same kernel image is rebuilt with
//! `#[cfg(test)]` tests collected by `custom_test_frameworks` and run under
//! QEMU, reporting results over the serial port and exiting QEMU through the
//! `isa-debug-exit` device rather than returning.

use core::panic::PanicInfo;

use crate::{serial_print, serial_println};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// A single `#[test_case]` entry. Blanket-implemented for `Fn()` so ordinary
/// `fn foo() { assert_eq!(...) }` tests need no boilerplate; a test fails by
/// panicking, the same as a hosted `#[test]`.
pub trait Testable {
    fn run(&self);
}

impl<T: Fn()> Testable for T {
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    serial_println!("running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("{info}\n");
    exit_qemu(QemuExitCode::Failed);
}

fn exit_qemu(code: QemuExitCode) -> ! {
    unsafe {
        crate::arch::x86::port::write_u32(0xf4, code as u32);
    }
    crate::arch::halt_loop();
}
