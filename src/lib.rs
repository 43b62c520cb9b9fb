//! Corvid kernel library: a preemptive multiprogramming kernel for
//! single-CPU 32-bit protected-mode x86.
//!
//! Exists as a library (rather than inlining everything into `main.rs`) so
//! `tests/` can drive kernel scenarios against the same code the bare-metal
//! binary boots, the way the teacher splits `lib.rs` from `main.rs`. There is
//! no hosted companion target: `.cargo/config.toml` pins every cargo
//! invocation, `cargo test` included, at the freestanding `i686-corvid.json`
//! target, so `cfg(test)` here means "this crate's own unit-test binary",
//! not "built with std" — `#[cfg(test)] mod tests { ... }` blocks scattered
//! through `sched`/`mm`/`process` use `#[test_case]`, not `#[test]`.

#![no_std]
#![cfg_attr(not(test), feature(alloc_error_handler))]
#![cfg_attr(test, no_main)]
#![cfg_attr(test, feature(custom_test_frameworks))]
#![cfg_attr(test, reexport_test_harness_main = "test_main")]
#![cfg_attr(test, test_runner(crate::test_framework::test_runner))]

extern crate alloc;

#[cfg(not(test))]
use linked_list_allocator::LockedHeap;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Size of the kernel heap handed to `ALLOCATOR` at boot. The backing pages
/// come from a static reservation in the kernel image rather than the frame
/// allocator, since the frame allocator itself needs to allocate before it's
/// initialized.
#[cfg(not(test))]
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[macro_use]
pub mod print;

pub mod arch;
pub mod boot;
pub mod config;
pub mod drivers;
pub mod elf;
pub mod error;
pub mod ids;
pub mod mm;
pub mod process;
pub mod sched;
pub mod serial;
pub mod sync;
pub mod syscall;

// Plain `cfg(test)` only covers this crate's own unit-test build; the
// `testing` feature (see Cargo.toml) additionally exposes this module to the
// `tests/*.rs` scenario binaries, which link this crate as an ordinary
// dependency rather than compiling it with `--cfg test` themselves.
#[cfg(any(test, feature = "testing"))]
pub mod test_framework;

#[cfg(not(test))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("panic: {}", info);
    arch::halt_loop();
}

// `cargo test --lib` rebuilds this crate itself as a freestanding test
// binary (no hosted target backs `cfg(test)` here), so it needs its own
// entry point and panic handler exactly like `main.rs` does for the real
// kernel image. Each `tests/*.rs` integration test is a separate crate and
// carries the same pair independently.
#[cfg(test)]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    boot::test_init();
    test_main();
    arch::halt_loop();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}
