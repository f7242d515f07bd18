// SPDX-License-Identifier: MIT

use core::fmt;
use std::path::Path;

use serde::Serialize;

use crate::{
    group::Location,
    pipeline::DeviceReport,
    timestamp::format_stamp,
};

/// Outcome of a run, one entry per device in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub devices: Vec<DeviceReport>,
}

impl Report {
    pub fn failed_devices(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(|d| d.failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed_devices().next().is_some()
    }

    pub fn event_count(&self) -> usize {
        self.devices.iter().map(|d| d.event_count).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let devices: Vec<JsonDevice<'_>> = self.devices.iter().map(JsonDevice::from).collect();
        serde_json::to_string_pretty(&JsonReport { devices })
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for item in items {
        write!(f, " {item}")?;
    }
    Ok(())
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GEOM {}", self.device)?;

        for loc in &self.locations {
            writeln!(
                f,
                "ERROR OFFSET {} SIZE {} COUNT {}",
                loc.offset, loc.length, loc.count
            )?;
        }

        if let Some(reason) = &self.failure {
            return writeln!(f, "FAILED {reason}");
        }

        for batch in &self.batches {
            write!(f, "FINDINODE BLOCKS")?;
            write_list(f, batch)?;
            writeln!(f)?;
        }

        if let Some(mnt) = &self.mountpoint {
            write!(f, "FINDPATH {} INODES", quoted(mnt))?;
            write_list(f, &self.inodes)?;
            writeln!(f)?;
        }

        for rec in &self.paths {
            write!(f, "PATH {} INODE {} BLOCKS", quoted(&rec.path), rec.inode)?;
            write_list(f, &rec.blocks)?;
            writeln!(f)?;
        }

        for warning in &self.warnings {
            writeln!(f, "WARN {warning}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for device in &self.devices {
            write!(f, "{device}")?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    devices: Vec<JsonDevice<'a>>,
}

#[derive(Serialize)]
struct JsonDevice<'a> {
    device: &'a str,
    stage: &'static str,
    event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    sector_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mountpoint: Option<&'a Path>,
    locations: Vec<JsonLocation>,
    translations: Vec<JsonTranslation>,
    batches: &'a [Vec<u64>],
    inodes: &'a [u64],
    paths: Vec<JsonPath<'a>>,
    warnings: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonLocation {
    offset: u64,
    length: u64,
    count: usize,
    first_seen: Option<String>,
    last_seen: Option<String>,
}

#[derive(Serialize)]
struct JsonTranslation {
    offset: u64,
    block: u64,
}

#[derive(Serialize)]
struct JsonPath<'a> {
    path: &'a Path,
    inode: u64,
    blocks: &'a [u64],
}

impl From<&Location> for JsonLocation {
    fn from(loc: &Location) -> Self {
        Self {
            offset: loc.offset,
            length: loc.length,
            count: loc.count,
            first_seen: loc.first_seen.as_ref().map(format_stamp),
            last_seen: loc.last_seen.as_ref().map(format_stamp),
        }
    }
}

impl<'a> From<&'a DeviceReport> for JsonDevice<'a> {
    fn from(d: &'a DeviceReport) -> Self {
        Self {
            device: &d.device,
            stage: d.stage.as_str(),
            event_count: d.event_count,
            sector_size: d.sector_size,
            mountpoint: d.mountpoint.as_deref(),
            locations: d.locations.iter().map(JsonLocation::from).collect(),
            translations: d
                .translations
                .iter()
                .map(|(&offset, &block)| JsonTranslation { offset, block })
                .collect(),
            batches: &d.batches,
            inodes: &d.inodes,
            paths: d
                .paths
                .iter()
                .map(|p| JsonPath {
                    path: &p.path,
                    inode: p.inode,
                    blocks: &p.blocks,
                })
                .collect(),
            warnings: &d.warnings,
            failure: d.failure.as_deref(),
        }
    }
}
