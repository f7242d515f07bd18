// SPDX-License-Identifier: MIT

//! Per-device diagnosis: locations, address translation, block owners, paths.

use core::fmt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use blkmap_ffs::{FfsMeta, offset_to_disk_block};
use blkmap_host::{
    Host, HostError, HostOps, HostResult, PathRecord, SystemHost, join_blocks,
};

use crate::{
    config::{Config, SectorSize},
    event::ErrorEvent,
    group::{DeviceErrors, Location, group_by_device},
    report::Report,
};

/// Progress of one device through the diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    GroupingErrors,
    TranslatingOffsets,
    ResolvingInodes,
    ResolvingPaths,
    Reporting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::GroupingErrors => "grouping_errors",
            Stage::TranslatingOffsets => "translating_offsets",
            Stage::ResolvingInodes => "resolving_inodes",
            Stage::ResolvingPaths => "resolving_paths",
            Stage::Reporting => "reporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything learned about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub device: String,
    pub stage: Stage,
    pub event_count: usize,
    pub locations: Vec<Location>,
    pub sector_size: Option<u64>,
    pub mountpoint: Option<PathBuf>,
    /// Failing offset -> disk block.
    pub translations: BTreeMap<u64, u64>,
    /// Blocks of each `findblk` session, in invocation order.
    pub batches: Vec<Vec<u64>>,
    /// Distinct owning inodes, ascending.
    pub inodes: Vec<u64>,
    /// Sorted by path.
    pub paths: Vec<PathRecord>,
    pub warnings: Vec<String>,
    pub failure: Option<String>,
}

impl DeviceReport {
    fn new(device: &str, event_count: usize) -> Self {
        Self {
            device: device.to_string(),
            stage: Stage::Idle,
            event_count,
            locations: Vec::new(),
            sector_size: None,
            mountpoint: None,
            translations: BTreeMap::new(),
            batches: Vec::new(),
            inodes: Vec::new(),
            paths: Vec::new(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    fn advance(&mut self, next: Stage) {
        log::debug!("{}: {} -> {}", self.device, self.stage, next);
        self.stage = next;
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}: {message}", self.device);
        self.warnings.push(message);
    }

    fn fail(mut self, error: &HostError) -> Self {
        let message = one_line(error);
        log::error!("{}: {message}", self.device);
        self.advance(Stage::Failed);
        self.failure = Some(message);
        self
    }
}

fn one_line(error: &HostError) -> String {
    error
        .to_string()
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs the diagnosis for every device found in the events.
#[derive(Debug)]
pub struct Diagnoser<H: HostOps = SystemHost> {
    host: Host<H>,
    config: Config,
}

impl Diagnoser<SystemHost> {
    pub fn system(config: Config) -> Self {
        let host = Host::system(config.tool_set());
        Self::new(host, config)
    }
}

impl<H: HostOps> Diagnoser<H> {
    pub fn new(host: Host<H>, config: Config) -> Self {
        Self { host, config }
    }

    pub fn host(&self) -> &Host<H> {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Diagnoses each device on up to `jobs` threads. Devices are reported in
    /// order of first appearance regardless of `jobs`.
    pub fn diagnose(&self, events: Vec<ErrorEvent>, jobs: usize) -> Report {
        let groups = group_by_device(events);
        let jobs = jobs.clamp(1, groups.len().max(1));

        let devices = if jobs == 1 {
            groups.iter().map(|g| self.diagnose_device(g)).collect()
        } else {
            self.diagnose_parallel(&groups, jobs)
        };

        Report { devices }
    }

    fn diagnose_parallel(&self, groups: &[DeviceErrors], jobs: usize) -> Vec<DeviceReport> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<DeviceReport>>> =
            groups.iter().map(|_| Mutex::new(None)).collect();

        thread::scope(|s| {
            for _ in 0..jobs {
                s.spawn(|| {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(group) = groups.get(i) else {
                            break;
                        };
                        let report = self.diagnose_device(group);
                        *slots[i].lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
                    }
                });
            }
        });

        slots
            .into_iter()
            .filter_map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }

    pub fn diagnose_device(&self, errors: &DeviceErrors) -> DeviceReport {
        let device = errors.device.as_str();
        let mut report = DeviceReport::new(device, errors.event_count());

        report.advance(Stage::GroupingErrors);
        report.locations = errors.locations(self.config.dedup);

        report.advance(Stage::TranslatingOffsets);
        let (sector_size, meta) = match self.describe(device) {
            Ok(described) => described,
            Err(error) => return report.fail(&error),
        };
        report.sector_size = Some(sector_size);
        report.mountpoint = Some(meta.mountpoint().to_path_buf());

        // Offset order, one block per offset, even when offsets share a block.
        let mut blocks = Vec::new();
        for offset in errors.unique_offsets() {
            let block = offset_to_disk_block(offset, sector_size, &meta);
            report.translations.insert(offset, block);
            blocks.push(block);
        }

        report.advance(Stage::ResolvingInodes);
        let resolution = self
            .host
            .resolve_blocks(device, &blocks, self.config.batch_size);
        for failure in &resolution.failures {
            report.warn(format!(
                "findblk {}: {}",
                join_blocks(&failure.blocks),
                one_line(&failure.error)
            ));
        }
        report.batches = resolution.batches.clone();
        report.inodes = resolution.inodes().into_iter().collect();

        report.advance(Stage::ResolvingPaths);
        match self
            .host
            .resolve_paths(meta.mountpoint(), &resolution.blocks_by_inode())
        {
            Ok(paths) => {
                report.paths = paths.records;
                for skipped in &paths.skipped {
                    report.warn(one_line(skipped));
                }
            }
            Err(error) => report.warn(format!("find: {}", one_line(&error))),
        }

        report.advance(Stage::Reporting);
        report.advance(Stage::Done);
        report
    }

    /// Sector size and filesystem layout, the lookups a device cannot do without.
    fn describe(&self, device: &str) -> HostResult<(u64, FfsMeta)> {
        let sector_size = match self.config.sector_size_for(device) {
            SectorSize::Fixed(n) => n,
            SectorSize::Provider => self.host.geometry(device)?.sector_size,
        };

        let mut meta = self.host.superblock(device)?;
        if let Some(mountpoint) = self.config.mountpoint_for(device) {
            meta = meta.with_mountpoint(mountpoint);
        }

        Ok((sector_size, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::ResolvingPaths.is_terminal());
        assert_eq!(Stage::TranslatingOffsets.to_string(), "translating_offsets");
    }

    #[test]
    fn failure_message_is_single_line() {
        let err = HostError::Superblock {
            device: "ad0".into(),
            source: blkmap_ffs::FfsError::MissingField("frag"),
        };
        let report = DeviceReport::new("ad0", 1).fail(&err);
        assert!(report.failed());
        assert_eq!(
            report.failure.as_deref(),
            Some("Unusable superblock on ad0 caused by: Missing superblock field 'frag'")
        );
    }
}
