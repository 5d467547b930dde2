use core::fmt::Arguments;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Platform console output: receives one formatted line per call.
pub type ConsoleSink = fn(Arguments);

/// `log` backend printing `[file:line] LEVEL: message` to the console.
pub struct Logger {
    sink: ConsoleSink,
    level: LevelFilter,
}

impl Logger {
    pub const fn new(sink: ConsoleSink, level: LevelFilter) -> Self {
        Self { sink, level }
    }
}

/// Install `logger` as the global `log` backend.
pub fn init(logger: &'static Logger) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            (self.sink)(format_args!(
                "[{}:{}] {}: {}\n",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            ));
        }
    }

    fn flush(&self) {
        // nothing
    }
}
