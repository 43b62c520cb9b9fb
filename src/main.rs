#![no_std]
#![no_main]

#[no_mangle]
pub extern "C" fn _start() -> ! {
    corvid_kernel::boot::init();
}
