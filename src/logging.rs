//! 全局日志，输出到 stderr，级别由环境变量 `MINIFAT_LOG` 决定

use colored::{Color, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const LOG_ENV: &str = "MINIFAT_LOG";

struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => Color::Red,
            Level::Warn => Color::BrightYellow,
            Level::Info => Color::Blue,
            Level::Debug => Color::Green,
            Level::Trace => Color::BrightBlack,
        };
        eprintln!(
            "{}",
            format!(
                "[{:>5}][{}:{}] {}",
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
            .color(color)
        );
    }

    fn flush(&self) {}
}

/// `ERROR|WARN|INFO|DEBUG|TRACE`，其他值（包括未设置）都按 WARN 处理
pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value.map(|v| v.to_ascii_uppercase()).as_deref() {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        Some("OFF") => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;
    // 重复初始化时保留已有的 logger
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_from(std::env::var(LOG_ENV).ok().as_deref()));
    }
}
