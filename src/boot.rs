//! Boot sequencing: bring up the ambient hardware stack, the memory
//! subsystem, the idle task, and the ROM executable table, then start the
//! first real task (spec §6).

use alloc::{string::String, sync::Arc, vec::Vec};

use crate::{arch, drivers, mm, process};

/// One entry in the boot-time table of executables baked into the kernel
/// image, looked up by name from `exec`/`fork`+`exec` and from the initial
/// task the kernel starts on its own.
pub struct RomExecutable {
    pub name: &'static str,
    pub bytes: &'static [u8],
}

/// Populated by the build that embeds user programs into the kernel image
/// (outside this crate's scope); kept empty here so the kernel still boots
/// and `exec`/`ls` degrade to "name not found" rather than failing to link.
pub static ROM_EXECUTABLES: &[RomExecutable] = &[];

pub fn lookup_executable(name: &str) -> Option<&'static RomExecutable> {
    ROM_EXECUTABLES.iter().find(|entry| entry.name == name)
}

pub fn executable_names() -> Vec<&'static str> {
    ROM_EXECUTABLES.iter().map(|entry| entry.name).collect()
}

/// Total installed RAM, normally read from the multiboot memory map; fixed
/// here since this crate doesn't implement multiboot info parsing.
const ASSUMED_MEMORY_BYTES: u32 = 64 * 1024 * 1024;

/// The name of the first task the kernel starts once booted, analogous to
/// `init` (spec §6 "the first task").
const INIT_PROGRAM_NAME: &str = "init";

/// Static backing storage for the kernel heap, initialized into
/// `ALLOCATOR` before anything in `boot::init` past this point allocates.
#[cfg(not(test))]
static mut KERNEL_HEAP: [u8; crate::HEAP_SIZE] = [0; crate::HEAP_SIZE];

pub fn init() -> ! {
    crate::print::init();
    arch::init();
    drivers::init();

    #[cfg(not(test))]
    unsafe {
        crate::ALLOCATOR
            .lock()
            .init(core::ptr::addr_of_mut!(KERNEL_HEAP) as *mut u8, crate::HEAP_SIZE);
    }

    mm::frame_allocator::init(ASSUMED_MEMORY_BYTES);
    mm::vmm::init_master(|master| {
        // Mirror the direct map and the rest of KVM; there's nothing to
        // populate yet beyond the zero'd, present-but-unmapped PDEs that
        // `PageDirectory::copy_pde_from` will propagate into every task.
        let _ = master;
    });

    let (idle_tid, _idle_pcb) = process::init_idle_task();
    log::info!("idle task started as tid {idle_tid}");

    match start_init_task() {
        Ok(()) => {}
        Err(err) => log::error!("failed to start {INIT_PROGRAM_NAME}: {err}"),
    }

    arch::x86::interrupts::enable();
    loop {
        arch::halt();
    }
}

/// Bring-up for the test harness entry point: just enough to make
/// `serial_print!`/`log::info!` work inside `#[test_case]` functions. Unlike
/// real boot, skips `arch::init`/`drivers::init`/the frame allocator: unit
/// tests exercise scheduler, memory-region, and process-table logic directly
/// and never touch the GDT/IDT/PIC those stubs stand in for under `cfg(test)`.
#[cfg(any(test, feature = "testing"))]
pub fn test_init() {
    crate::print::init();
}

fn start_init_task() -> crate::error::Result<()> {
    let rom_entry = lookup_executable(INIT_PROGRAM_NAME).ok_or(crate::error::KernelError::Name)?;
    let image = crate::elf::Image::parse(rom_entry.bytes)?;
    let argv = [String::from(INIT_PROGRAM_NAME)];
    let (space, user_esp) = process::exec::build_address_space(&image, &argv)?;

    let tid = crate::ids::next_tid();
    let pcb = Arc::new(crate::process::pcb::Pcb::new(None, String::from(INIT_PROGRAM_NAME), tid));
    pcb.set_dir_phys(space.directory.phys);
    *pcb.address_space.lock() = Some(space);
    process::table::register_pcb(pcb.clone());
    process::table::set_init_pid(pcb.pid);

    let tcb = process::spawn_thread(pcb, tid);
    process::exec::prime_entry(&tcb, image.entry(), user_esp);
    crate::sched::enqueue_new_thread(tcb.tid);
    Ok(())
}
