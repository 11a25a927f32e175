use std::fmt;
use std::sync::Arc;

use log::{Level, LevelFilter, Log, Record};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

/// Logger handed to whoever needs to report; owned, not installed globally.
pub type SharedLogger = Arc<dyn Log>;

pub fn console_logger(level: LevelFilter) -> Result<SharedLogger, String> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l:<5} {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("stderr", Box::new(stderr)),
        )
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| format!("invalid logging configuration: {}", err))?;

    Ok(Arc::new(log4rs::Logger::new(config)))
}

pub fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse::<LevelFilter>()
        .map_err(|_| format!("invalid log level: {}", value))
}

pub fn emit(logger: &dyn Log, level: Level, target: &str, args: fmt::Arguments) {
    let record = Record::builder()
        .args(args)
        .level(level)
        .target(target)
        .build();
    if logger.enabled(record.metadata()) {
        logger.log(&record);
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use log::{Level, Log, Metadata, Record};

    /// Keeps every record in memory so tests can inspect what was reported.
    pub struct MemoryLog {
        pub lines: Mutex<Vec<(Level, String)>>,
    }

    impl MemoryLog {
        pub fn new() -> MemoryLog {
            MemoryLog {
                lines: Mutex::new(Vec::new()),
            }
        }

        pub fn lines_at(&self, level: Level) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        }
    }

    impl Log for MemoryLog {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.lines
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }
}
