// SPDX-License-Identifier: MIT

use core::fmt;
use std::path::PathBuf;

/// Fatal defects in the error log itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    /// A GEOM error line matched but one of its numerals does not fit in 64 bits.
    Overflow {
        line: usize,
        field: &'static str,
        digits: String,
    },
    /// The input could not be read.
    Io { line: usize, reason: String },
}

impl EventParseError {
    pub fn msg(&self) -> &'static str {
        match self {
            EventParseError::Overflow { .. } => "Numeric field overflows 64 bits",
            EventParseError::Io { .. } => "Failed to read input",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            EventParseError::Overflow { line, .. } | EventParseError::Io { line, .. } => *line,
        }
    }
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventParseError::Overflow {
                line,
                field,
                digits,
            } => write!(f, "{} at line {line}: {field}={digits}", self.msg()),
            EventParseError::Io { line, reason } => {
                write!(f, "{} after line {line}: {reason}", self.msg())
            }
        }
    }
}

impl std::error::Error for EventParseError {}

/// Errors in the configuration file or in option values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: PathBuf, reason: String },
    Parse(String),
    /// A value parsed but violates its allowed range.
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn msg(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "Cannot read config",
            ConfigError::Parse(_) => "Malformed config",
            ConfigError::Invalid { .. } => "Invalid config value",
        }
    }

    pub(crate) fn invalid<S: Into<String>>(key: &'static str, reason: S) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, reason } => {
                write!(f, "{} {}: {reason}", self.msg(), path.display())
            }
            ConfigError::Parse(reason) => write!(f, "{}: {reason}", self.msg()),
            ConfigError::Invalid { key, reason } => write!(f, "{} '{key}': {reason}", self.msg()),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
