//! A `log::Log` implementation over the console sink.
//!
//! Scheduler code never writes to the console directly for diagnostics; it
//! calls `log::trace!`/`debug!`/`warn!` for admission, demotion, boost,
//! kill, and share-accounting events, and this logger is what drains those
//! calls back out through the console macro.

use crate::console::printf::println;
use log::{LevelFilter, Log, Metadata, Record};

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger. Idempotent-safe to call more than once: a
/// second call's `Err` (logger already set) is ignored rather than a fatal
/// invariant, since double-init during test setup is harmless.
pub fn init(max_level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max_level);
}
