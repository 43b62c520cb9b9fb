//! COM1 serial port, used for structured kernel logging independent of the
//! VGA console (spec §1 external collaborators) so panic and log output
//! keeps working even if the console driver itself is what's broken.

use core::fmt;

#[cfg(target_arch = "x86")]
use spin::Mutex;

#[cfg(target_arch = "x86")]
static SERIAL: Mutex<uart_16550::SerialPort> = unsafe { Mutex::new(uart_16550::SerialPort::new(0x3F8)) };

pub fn init() {
    #[cfg(target_arch = "x86")]
    SERIAL.lock().init();
}

#[doc(hidden)]
pub fn _print(_args: fmt::Arguments) {
    #[cfg(target_arch = "x86")]
    {
        use core::fmt::Write;
        let _ = SERIAL.lock().write_fmt(_args);
    }
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
