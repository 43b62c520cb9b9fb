//! `print!`/`println!` macros over the VGA console, and the `log::Log`
//! implementation that routes structured kernel logging to the serial port.

use core::fmt;

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;

    struct ConsoleWriter;
    impl fmt::Write for ConsoleWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            crate::drivers::console::print(s.as_bytes());
            Ok(())
        }
    }

    let _ = ConsoleWriter.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Routes `log::info!`/`warn!`/`error!` etc. to the serial port, independent
/// of the VGA console so a console fault doesn't also lose diagnostics.
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        crate::serial_println!("[{:>5} {}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Install the global logger. Called once from `boot::init`, before anything
/// else uses `log::info!`/`log::error!`.
pub fn init() {
    crate::serial::init();
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .ok();
}
