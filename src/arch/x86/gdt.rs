//! Global descriptor table: one flat kernel code/data pair, one flat user
//! code/data pair, and a TSS carrying `esp0` for ring 3 → ring 0 traps.

use core::mem::size_of;

use spin::Once;
use x86::{dtables::DescriptorTablePointer, segmentation, task::load_tr};

/// Selector indices, fixed by convention so `swexn`/`exec` can hard-code
/// the user `cs`/`ss` values they install into a saved register frame.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_CODE_SELECTOR: u16 = 0x1B; // index 3, RPL 3
pub const USER_DATA_SELECTOR: u16 = 0x23; // index 4, RPL 3
pub const TSS_SELECTOR: u16 = 0x28;

#[repr(C, packed)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    const fn null() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

#[repr(C, packed)]
struct TaskStateSegment {
    link: u16,
    _r0: u16,
    esp0: u32,
    ss0: u16,
    _r1: u16,
    rest: [u32; 23],
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            link: 0,
            _r0: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR,
            _r1: 0,
            rest: [0; 23],
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

const GDT_ENTRIES: usize = 6;

struct Gdt {
    table: [GdtEntry; GDT_ENTRIES],
}

static mut GDT: Gdt = Gdt {
    table: [
        GdtEntry::null(),
        GdtEntry::new(0, 0xFFFFF, 0x9A, 0xC), // kernel code
        GdtEntry::new(0, 0xFFFFF, 0x92, 0xC), // kernel data
        GdtEntry::new(0, 0xFFFFF, 0xFA, 0xC), // user code
        GdtEntry::new(0, 0xFFFFF, 0xF2, 0xC), // user data
        GdtEntry::null(),                     // patched with the TSS base/limit at init
    ],
};

static mut TSS: TaskStateSegment = TaskStateSegment::new();

static INIT: Once<()> = Once::new();

/// Install the GDT and TSS and load `tr`.
pub fn init() {
    INIT.call_once(|| unsafe {
        let tss_base = core::ptr::addr_of!(TSS) as u32;
        let tss_limit = (size_of::<TaskStateSegment>() - 1) as u32;
        GDT.table[5] = GdtEntry::new(tss_base, tss_limit, 0x89, 0x0);

        let ptr = DescriptorTablePointer::new_from_slice(&*core::ptr::addr_of!(GDT.table));
        x86::dtables::lgdt(&ptr);

        segmentation::load_cs(segmentation::SegmentSelector::from_raw(KERNEL_CODE_SELECTOR));
        segmentation::load_ds(segmentation::SegmentSelector::from_raw(KERNEL_DATA_SELECTOR));
        segmentation::load_es(segmentation::SegmentSelector::from_raw(KERNEL_DATA_SELECTOR));
        segmentation::load_ss(segmentation::SegmentSelector::from_raw(KERNEL_DATA_SELECTOR));

        load_tr(segmentation::SegmentSelector::from_raw(TSS_SELECTOR));
    });
}

/// Update the TSS `esp0` field used on the next ring 3 → ring 0 trap.
///
/// Called by the scheduler's `next()` whenever it switches to a thread
/// running in user mode, so a trap taken from that thread lands on the
/// correct kernel stack.
pub fn set_kernel_stack(esp0: u32) {
    unsafe {
        TSS.esp0 = esp0;
    }
}
