//! Monotonic tick counter driven by the PIT, wakes sleepers and preempts
//! (spec §4.12).

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::TICK_HZ;

static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    pit::program(TICK_HZ);
}

/// Current tick count, read by `get_ticks` and by sleepers computing their
/// wake tick.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Acquire)
}

/// Called from the timer IRQ handler (interrupts already off, per spec §5).
/// Increments the tick, acknowledges the PIC, wakes due sleepers, and
/// reschedules.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::AcqRel);
    pit::acknowledge();
    crate::sched::wake_due_sleepers(TICKS.load(Ordering::Acquire));
    crate::sched::next();
}

/// PIT channel/divisor programming and PIC acknowledgement: the "PIC/timer
/// chip programming" spec §1 names as an external collaborator.
mod pit {
    use crate::arch::x86::port;

    const PIT_CHANNEL0: u16 = 0x40;
    const PIT_COMMAND: u16 = 0x43;
    const PIT_BASE_HZ: u32 = 1_193_182;
    const PIC_EOI: u8 = 0x20;
    const PIC1_COMMAND: u16 = 0x20;

    pub fn program(hz: u32) {
        let divisor = (PIT_BASE_HZ / hz).clamp(1, u16::MAX as u32) as u16;
        unsafe {
            port::write_u8(PIT_COMMAND, 0x36);
            port::write_u8(PIT_CHANNEL0, (divisor & 0xFF) as u8);
            port::write_u8(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);
        }
    }

    pub fn acknowledge() {
        unsafe {
            port::write_u8(PIC1_COMMAND, PIC_EOI);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn ticks_start_at_zero() {
        assert_eq!(TICKS.load(Ordering::Acquire), 0);
    }
}
