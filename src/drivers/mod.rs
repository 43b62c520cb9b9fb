//! Device drivers owned directly by the kernel: console, keyboard, timer.
//!
//! Each driver owns the *logical* state spec §4 describes (linear
//! character buffer and cursor, scancode ring buffer and divider, tick
//! counter) and calls through a narrow boundary for the actual register
//! pokes (CRTC ports, 8042 controller, PIT channel/divisor), which spec §1
//! names as external collaborators.

pub mod console;
pub mod keyboard;
pub mod timer;

/// Initialize every driver. Called once from `boot()` after `arch::init()`.
pub fn init() {
    console::init();
    keyboard::init();
    timer::init();
}
