//! Physical frame allocator: a bitmap free list over `MAX_PHYSICAL_FRAMES`
//! (spec §4.1). One bit per frame, `1` meaning free, scanned linearly;
//! there is exactly one size class (a single 4 KiB frame) so this stays a
//! flat bitmap rather than the teacher's bitmap+buddy hybrid.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::{
    config::{FRAME_BITMAP_WORDS, LOW_MEM_RESERVED, MAX_PHYSICAL_FRAMES, PAGE_SIZE},
    error::{KernelError, Result},
};

struct Bitmap {
    words: [u64; FRAME_BITMAP_WORDS],
}

impl Bitmap {
    const fn new() -> Self {
        Self {
            words: [0; FRAME_BITMAP_WORDS],
        }
    }

    fn set_free(&mut self, index: usize, free: bool) {
        let word = index / 64;
        let bit = index % 64;
        if free {
            self.words[word] |= 1 << bit;
        } else {
            self.words[word] &= !(1 << bit);
        }
    }

    fn is_free(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    fn find_and_claim_free(&mut self) -> Option<usize> {
        for (word_idx, word) in self.words.iter_mut().enumerate() {
            if *word == 0 {
                continue;
            }
            let bit = word.trailing_zeros() as usize;
            *word &= !(1 << bit);
            return Some(word_idx * 64 + bit);
        }
        None
    }
}

static BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::new());
static FREE_COUNT: AtomicUsize = AtomicUsize::new(0);
static TOTAL_FRAMES: AtomicUsize = AtomicUsize::new(0);

/// Frames admitted against the kernel pool by [`request_frames`] but not yet
/// drawn down by [`alloc_kernel_page`] (spec §4.1 "kernel pool"/"user pool").
static KERNEL_RESERVED: AtomicUsize = AtomicUsize::new(0);

/// Mark `[LOW_MEM_RESERVED, total_bytes)` as available, reserving the
/// low-memory BIOS region below it. Called once at boot with the size
/// reported by the multiboot memory map.
pub fn init(total_bytes: u32) {
    let reserved_frames = (LOW_MEM_RESERVED as usize) / PAGE_SIZE;
    let total_frames = ((total_bytes as usize) / PAGE_SIZE).min(MAX_PHYSICAL_FRAMES);
    let mut bitmap = BITMAP.lock();
    for index in reserved_frames..total_frames {
        bitmap.set_free(index, true);
    }
    FREE_COUNT.store(total_frames.saturating_sub(reserved_frames), Ordering::Release);
    TOTAL_FRAMES.store(total_frames, Ordering::Release);
}

/// Allocate one physical frame, returning its physical base address.
pub fn alloc_frame() -> Option<u32> {
    let index = BITMAP.lock().find_and_claim_free()?;
    FREE_COUNT.fetch_sub(1, Ordering::AcqRel);
    Some((index * PAGE_SIZE) as u32)
}

/// # Safety
/// `phys` must have come from `alloc_frame` and must not still be mapped
/// anywhere.
pub unsafe fn free_frame(phys: u32) {
    let index = (phys as usize) / PAGE_SIZE;
    let mut bitmap = BITMAP.lock();
    debug_assert!(!bitmap.is_free(index), "double free of physical frame {phys:#x}");
    bitmap.set_free(index, true);
    FREE_COUNT.fetch_add(1, Ordering::AcqRel);
}

pub fn free_frames() -> usize {
    FREE_COUNT.load(Ordering::Acquire)
}

pub fn total_frames() -> usize {
    TOTAL_FRAMES.load(Ordering::Acquire)
}

pub fn kernel_reserved() -> usize {
    KERNEL_RESERVED.load(Ordering::Acquire)
}

/// Admit a reservation of `n_kernel` kernel-pool frames against current
/// capacity while also confirming `n_user` user-pool frames are presently
/// available, without charging the user pool up front (spec §4.1: "a
/// kernel-pool reservation is admitted only if total outstanding kernel
/// demand remains satisfiable").
pub fn request_frames(n_user: usize, n_kernel: usize) -> Result<()> {
    if free_frames() < n_user + n_kernel {
        return Err(KernelError::NoMem);
    }
    KERNEL_RESERVED.fetch_add(n_kernel, Ordering::AcqRel);
    Ok(())
}

/// Allocate a frame charged against the user pool (pages only ever reachable
/// through a task's page tables: ZFOD resolution, `new_pages`, stack growth,
/// `fork`'s eager copy).
pub fn alloc_user_frame() -> Result<u32> {
    alloc_frame().ok_or(KernelError::NoMem)
}

/// Release a frame previously handed out by [`alloc_user_frame`].
pub fn free_user_frame(phys: u32) {
    unsafe { free_frame(phys) };
}

/// Allocate a frame charged against the kernel pool (page directories,
/// second-level page tables, KVM-backed objects), drawing down any
/// outstanding [`request_frames`] reservation, and return its permanent
/// direct-mapped kernel-virtual address: kernel-pool frames are always
/// direct mapped, so the low bits of the returned address equal the
/// physical address (spec §4.1 "alloc_kernel_page").
pub fn alloc_kernel_page() -> Result<u32> {
    let phys = alloc_frame().ok_or(KernelError::NoMem)?;
    let _ = KERNEL_RESERVED.fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
        Some(reserved.saturating_sub(1))
    });
    Ok(crate::mm::page_table::phys_to_kernel_ptr(phys) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_then_free_round_trips_the_same_frame_count() {
        init(8 * PAGE_SIZE as u32);
        let before = free_frames();
        let a = alloc_frame().expect("frame available");
        let b = alloc_frame().expect("frame available");
        assert_ne!(a, b);
        assert_eq!(free_frames(), before - 2);
        unsafe {
            free_frame(a);
            free_frame(b);
        }
        assert_eq!(free_frames(), before);
    }

    #[test_case]
    fn never_allocates_below_low_mem_reserved() {
        init(LOW_MEM_RESERVED + 4 * PAGE_SIZE as u32);
        for _ in 0..4 {
            let phys = alloc_frame().expect("frame available");
            assert!(phys >= LOW_MEM_RESERVED);
        }
        assert!(alloc_frame().is_none());
    }

    #[test_case]
    fn request_frames_rejects_demand_past_free_capacity() {
        init(4 * PAGE_SIZE as u32);
        let free = free_frames();
        assert_eq!(request_frames(1, free), Ok(()));
        assert_eq!(kernel_reserved(), free);
        assert_eq!(request_frames(1, 1), Err(KernelError::NoMem));
    }

    #[test_case]
    fn alloc_kernel_page_draws_down_the_reservation() {
        init(4 * PAGE_SIZE as u32);
        request_frames(0, 1).expect("reservation admitted");
        assert_eq!(kernel_reserved(), 1);
        let page = alloc_kernel_page().expect("kernel frame available");
        assert_eq!(kernel_reserved(), 0);
        unsafe { free_frame(page - crate::config::PHYS_MAP_BASE) };
    }
}
