//! Declarations for the hand-written assembly this crate hands control to
//! and receives control from. Spec §1 names these as external
//! collaborators ("the hand-written x86 trampolines for interrupt entry,
//! `iret`-based mode switch, and the raw `context_switch` stack swap");
//! this module is the one place their signatures are declared so every
//! Rust call site goes through a typed boundary instead of ad hoc `asm!`.
//!
//! None of these bodies live in this crate. A real kernel image links them
//! in from a `.s`/`global_asm!` unit that is not part of `SPEC_FULL.md`'s
//! scope.

extern "C" {
    /// Low-level entry point for every interrupt/exception/trap gate in the
    /// IDT. Pushes a raw register frame and calls
    /// [`crate::syscall::dispatch_syscall`] with a pointer to it, then either
    /// `iret`s back to the interrupted context (hardware interrupts,
    /// recoverable faults) or falls through to [`mode_switch_to_user`]
    /// (syscall return, swexn delivery).
    pub fn trap_entry();

    /// Swap kernel stacks: save the current `esp` to `*save_esp`, load
    /// `new_esp`, and if `new_cr3 != 0` load it into `cr3` before
    /// returning on the new stack. This is the only primitive the
    /// scheduler's `next()` needs from assembly; everything else
    /// (choosing the next thread, updating `esp0`) is ordinary Rust.
    pub fn context_switch(save_esp: *mut u32, new_esp: u32, new_cr3: u32);

    /// Transfer to user mode at `entry` with user stack `user_esp` and
    /// initial `eflags`, via `iret`. Never returns.
    pub fn mode_switch_to_user(entry: u32, user_esp: u32, eflags: u32) -> !;

    /// The shared trap-exit tail `trap_entry` itself falls through to after
    /// an ordinary syscall/interrupt handler returns: pop the [`Ureg`] at
    /// `ureg`, restore segment/general-purpose registers from it, and
    /// `iret`. Exposed separately so `fork`/`thread_fork` can resume a child
    /// into a *copy* of its parent's trap frame instead of the frame that
    /// was actually on the stack when the trap fired.
    ///
    /// [`Ureg`]: crate::syscall::Ureg
    pub fn resume_trap_frame(ureg: *const u8) -> !;
}

/// Lay out a brand new kernel stack so that the first `context_switch` into
/// it lands in `resume_at` instead of a previously saved context.
///
/// Mirrors the frame `context_switch` itself pushes (four callee-saved
/// registers, then a return address) so a thread that has never run can be
/// dispatched through the exact same path as one being resumed. `resume_at`
/// therefore must never return.
///
/// # Safety
/// `kstack_top` must be the top of a one-page kernel stack owned
/// exclusively by the thread this esp is being prepared for, and that
/// thread must not yet be visible to the scheduler.
pub unsafe fn prepare_new_thread_stack(kstack_top: u32, resume_at: extern "C" fn() -> !) -> u32 {
    const SAVED_REGISTERS: usize = 4; // ebx, esi, edi, ebp, in context_switch's push order
    let mut esp = kstack_top;
    esp -= core::mem::size_of::<u32>() as u32;
    core::ptr::write(esp as *mut u32, resume_at as u32);
    for _ in 0..SAVED_REGISTERS {
        esp -= core::mem::size_of::<u32>() as u32;
        core::ptr::write(esp as *mut u32, 0);
    }
    esp
}
