// SPDX-License-Identifier: MIT

use std::io::Write;

use ::log::{Level, LevelFilter};
use colored::{ColoredString, Colorize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl LogLevel {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => LogLevel::Quiet,
            (false, 0) => LogLevel::Normal,
            (false, 1) => LogLevel::Verbose,
            (false, _) => LogLevel::Trace,
        }
    }

    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Quiet => LevelFilter::Error,
            LogLevel::Normal => LevelFilter::Info,
            LogLevel::Verbose => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn tag(level: Level) -> ColoredString {
    match level {
        Level::Error => "error".red().bold(),
        Level::Warn => "warn".yellow().bold(),
        Level::Info => "info".green(),
        Level::Debug => "debug".blue(),
        Level::Trace => "trace".dimmed(),
    }
}

/// Logs to stderr as `[blkmap] <level> <message>`. `RUST_LOG` wins over `level`.
pub fn init_logger(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.filter())
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[blkmap] {} {}", tag(record.level()), record.args()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_levels() {
        assert_eq!(LogLevel::from_flags(false, 0), LogLevel::Normal);
        assert_eq!(LogLevel::from_flags(false, 1), LogLevel::Verbose);
        assert_eq!(LogLevel::from_flags(false, 4), LogLevel::Trace);
        assert_eq!(LogLevel::from_flags(true, 2), LogLevel::Quiet);
        assert_eq!(LogLevel::Quiet.filter(), LevelFilter::Error);
        assert_eq!(LogLevel::Verbose.filter(), LevelFilter::Debug);
    }
}
