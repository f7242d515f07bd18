// SPDX-License-Identifier: MIT

use core::fmt;
use std::path::PathBuf;

use blkmap_ffs::FfsError;

/// Result type for host tool invocations.
pub type HostResult<T = ()> = core::result::Result<T, HostError>;

/// Errors raised while talking to the external tools.
///
/// Errors are cached per device alongside successful lookups, so every
/// variant owns plain data and is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Required binaries are not installed or not in PATH.
    MissingBinaries(Vec<String>),
    /// The process could not be started.
    Spawn { tool: String, reason: String },
    /// Reading from or writing to the process pipes failed.
    Io { tool: String, reason: String },
    /// The process did not finish in time and was killed.
    Timeout { tool: String, secs: u64 },
    /// The process exited unsuccessfully.
    ExitStatus {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
    /// Output that should have been text was not valid UTF-8.
    Utf8 { tool: String },
    /// The GEOM configuration tree could not be parsed.
    Topology(String),
    /// No GEOM provider carries this name.
    ProviderNotFound(String),
    /// The provider lacks a usable attribute.
    ProviderAttribute {
        provider: String,
        attribute: &'static str,
    },
    /// The superblock dump could not be interpreted.
    Superblock { device: String, source: FfsError },
    /// A path returned by the search could not be stat'ed.
    Stat { path: PathBuf, reason: String },
    /// A request exceeded what the tool accepts in one invocation.
    Invalid(String),
    Unsupported(&'static str),
}

impl HostError {
    pub fn msg(&self) -> &'static str {
        match self {
            HostError::MissingBinaries(_) => "Missing required tool(s)",
            HostError::Spawn { .. } => "Failed to start tool",
            HostError::Io { .. } => "Tool I/O error",
            HostError::Timeout { .. } => "Tool timed out",
            HostError::ExitStatus { .. } => "Tool failed",
            HostError::Utf8 { .. } => "Tool output is not valid UTF-8",
            HostError::Topology(_) => "Invalid GEOM configuration",
            HostError::ProviderNotFound(_) => "GEOM provider not found",
            HostError::ProviderAttribute { .. } => "GEOM provider attribute missing",
            HostError::Superblock { .. } => "Unusable superblock",
            HostError::Stat { .. } => "Cannot stat path",
            HostError::Invalid(_) => "Invalid tool request",
            HostError::Unsupported(_) => "Unsupported on this platform",
        }
    }

    pub fn cause(&self) -> Option<&FfsError> {
        match self {
            HostError::Superblock { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            HostError::MissingBinaries(bins) => write!(f, ": {}", bins.join(", ")),
            HostError::Spawn { tool, reason } | HostError::Io { tool, reason } => {
                write!(f, " `{tool}`: {reason}")
            }
            HostError::Timeout { tool, secs } => write!(f, " `{tool}` after {secs}s"),
            HostError::ExitStatus { tool, code, stderr } => {
                match code {
                    Some(code) => write!(f, " `{tool}` with exit code {code}")?,
                    None => write!(f, " `{tool}`: killed by signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, " ({stderr})")?;
                }
                Ok(())
            }
            HostError::Utf8 { tool } => write!(f, " (`{tool}`)"),
            HostError::Topology(reason) => write!(f, ": {reason}"),
            HostError::ProviderNotFound(name) => write!(f, ": {name}"),
            HostError::ProviderAttribute {
                provider,
                attribute,
            } => write!(f, ": {provider}.{attribute}"),
            HostError::Superblock { device, source } => {
                write!(f, " on {device}\n  caused by: {source}")
            }
            HostError::Stat { path, reason } => write!(f, " {}: {reason}", path.display()),
            HostError::Invalid(reason) => write!(f, ": {reason}"),
            HostError::Unsupported(what) => write!(f, ": {what}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
