//! Compile-time kernel configuration.
//!
//! Centralizes the memory map from spec §6 so it is defined once instead of
//! being re-derived as magic numbers across `mm`, `process`, and `syscall`.

/// Size of a physical frame / virtual page.
pub const PAGE_SIZE: usize = 4096;

/// Number of entries in a page directory or page table.
pub const PAGE_TABLE_ENTRIES: usize = 1024;

/// `[0, 1 MiB)` is reserved for real-mode/BIOS structures.
pub const LOW_MEM_RESERVED: u32 = 0x0010_0000;

/// Start of the direct-mapped kernel region; also the start of low memory.
pub const KERNEL_MEM_START: u32 = 0x0000_0000;

/// Start of per-task user address space. Everything below this is the
/// direct-mapped kernel region, identical (and global) in every task.
pub const USER_MEM_START: u32 = 0x0100_0000;

/// End of per-task user address space / start of the shared kernel-virtual
/// region (KVM).
pub const USER_MEM_END: u32 = 0xB000_0000;

/// Fixed top of the initial user stack (grows down from here).
pub const USER_STACK_BASE: u32 = 0xC000_0000;

/// Kernel stacks are one page, so `align_down(esp, PAGE_SIZE)` recovers the
/// TCB stored at the stack's base.
pub const KERNEL_STACK_PAGES: usize = 1;

/// Timer interrupt frequency (spec §4.12: "~10 ms ticks").
pub const TICK_HZ: u32 = 100;

/// Maximum combined length of `exec`'s `name` + `argv` strings copied into
/// the bounded kernel buffer.
pub const EXEC_ARG_BUFFER_LIMIT: usize = 4096;

/// Power-of-two size of the keyboard input ring buffer.
pub const KEYBOARD_BUFFER_SIZE: usize = 256;

/// Console dimensions (character cells).
pub const CONSOLE_WIDTH: usize = 80;
pub const CONSOLE_HEIGHT: usize = 25;

/// Physical memory this kernel's frame allocator can track (128 MiB), sized
/// generously above what the spec's test machines provision. A real boot
/// would read this from the multiboot memory map instead of a constant.
pub const MAX_PHYSICAL_FRAMES: usize = 32 * 1024;
pub const FRAME_BITMAP_WORDS: usize = MAX_PHYSICAL_FRAMES / 64;

/// Start of the permanent one-to-one map of all physical memory into kernel
/// space (part of the KVM region, present in every page directory), used so
/// kernel code can read/write a page table or directory by its physical
/// address without a temporary mapping.
pub const PHYS_MAP_BASE: u32 = USER_MEM_END;
pub const PHYS_MAP_SIZE: u32 = (MAX_PHYSICAL_FRAMES * PAGE_SIZE) as u32;
pub const PHYS_MAP_END: u32 = PHYS_MAP_BASE + PHYS_MAP_SIZE;
