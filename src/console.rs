use crate::task::try_current_tid;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;

/// 安装内核日志器
///
/// 日志级别取自编译期环境变量 `LOG`，未设置时关闭。重复调用被忽略。
pub fn init() {
    static LOGGER: Logger = Logger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_filter(option_env!("LOG")));
    }
}

fn level_filter(level: Option<&str>) -> LevelFilter {
    match level {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

struct Logger;

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = level_to_color_code(record.level());
        let mut stderr = std::io::stderr().lock();
        let _ = match try_current_tid() {
            Some(tid) => writeln!(stderr, "\x1b[{}mtid {}: {}\x1b[0m", color, tid, record.args()),
            None => writeln!(stderr, "\x1b[{}mkernel: {}\x1b[0m", color, record.args()),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_map_to_filters() {
        assert_eq!(level_filter(Some("trace")), LevelFilter::Trace);
        assert_eq!(level_filter(Some("warn")), LevelFilter::Warn);
        assert_eq!(level_filter(Some("verbose")), LevelFilter::Off);
        assert_eq!(level_filter(None), LevelFilter::Off);
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        log::info!("logger installed");
    }
}
