// SPDX-License-Identifier: MIT

//! Turns GEOM I/O error log lines into the files they hit: log parsing,
//! per-device grouping, the diagnosis pipeline and its report.

pub mod config;
pub mod error;
pub mod event;
pub mod group;
pub mod pipeline;
pub mod report;
pub mod timestamp;

pub use config::{Config, DeviceOverride, SectorSize, ToolNames};
pub use error::{ConfigError, EventParseError};
pub use event::{ErrorEvent, EventParser};
pub use group::{DedupPolicy, DeviceErrors, Location, group_by_device, locations};
pub use pipeline::{DeviceReport, Diagnoser, Stage};
pub use report::Report;
pub use timestamp::{StampParser, YearPolicy, format_stamp};
