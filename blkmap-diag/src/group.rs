// SPDX-License-Identifier: MIT

use core::fmt;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use serde::Deserialize;
use time::PrimitiveDateTime;

use crate::{error::ConfigError, event::ErrorEvent};

/// How events of one device collapse into reported locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// One location per distinct `(offset, length)`.
    #[default]
    Exact,
    /// Overlapping or adjacent byte ranges become one location.
    MergeOverlapping,
}

impl FromStr for DedupPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(DedupPolicy::Exact),
            "merge-overlapping" | "merge" => Ok(DedupPolicy::MergeOverlapping),
            other => Err(ConfigError::invalid(
                "dedup",
                format!("expected 'exact' or 'merge-overlapping', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupPolicy::Exact => f.write_str("exact"),
            DedupPolicy::MergeOverlapping => f.write_str("merge-overlapping"),
        }
    }
}

/// A distinct failing byte range and how often it was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub offset: u64,
    pub length: u64,
    pub count: usize,
    pub first_seen: Option<PrimitiveDateTime>,
    pub last_seen: Option<PrimitiveDateTime>,
}

impl Location {
    fn from_event(event: &ErrorEvent) -> Self {
        Self {
            offset: event.offset,
            length: event.length,
            count: 1,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
        }
    }

    fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    fn absorb_stamps(&mut self, first: Option<PrimitiveDateTime>, last: Option<PrimitiveDateTime>) {
        self.first_seen = match (self.first_seen, first) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_seen = match (self.last_seen, last) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// All events of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceErrors {
    pub device: String,
    pub events: Vec<ErrorEvent>,
}

impl DeviceErrors {
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn locations(&self, policy: DedupPolicy) -> Vec<Location> {
        locations(&self.events, policy)
    }

    /// Distinct failing offsets, ascending. Length plays no part.
    pub fn unique_offsets(&self) -> BTreeSet<u64> {
        self.events.iter().map(|e| e.offset).collect()
    }
}

/// Groups events by device, devices in order of first appearance.
pub fn group_by_device(events: Vec<ErrorEvent>) -> Vec<DeviceErrors> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<DeviceErrors> = Vec::new();

    for event in events {
        match index.get(&event.device) {
            Some(&i) => groups[i].events.push(event),
            None => {
                index.insert(event.device.clone(), groups.len());
                groups.push(DeviceErrors {
                    device: event.device.clone(),
                    events: vec![event],
                });
            }
        }
    }

    groups
}

/// Collapses events into locations.
///
/// `Exact` keeps first-appearance order; `MergeOverlapping` yields ranges
/// sorted by offset.
pub fn locations(events: &[ErrorEvent], policy: DedupPolicy) -> Vec<Location> {
    let exact = exact_locations(events);
    match policy {
        DedupPolicy::Exact => exact,
        DedupPolicy::MergeOverlapping => merge_overlapping(exact),
    }
}

fn exact_locations(events: &[ErrorEvent]) -> Vec<Location> {
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut out: Vec<Location> = Vec::new();

    for event in events {
        match index.get(&(event.offset, event.length)) {
            Some(&i) => {
                let loc = &mut out[i];
                loc.count += 1;
                loc.absorb_stamps(event.timestamp, event.timestamp);
            }
            None => {
                index.insert((event.offset, event.length), out.len());
                out.push(Location::from_event(event));
            }
        }
    }

    out
}

fn merge_overlapping(mut locs: Vec<Location>) -> Vec<Location> {
    locs.sort_by_key(|l| (l.offset, l.length));

    let mut merged: Vec<Location> = Vec::with_capacity(locs.len());
    for loc in locs {
        match merged.last_mut() {
            Some(cur) if loc.offset <= cur.end() => {
                let end = cur.end().max(loc.end());
                cur.length = end - cur.offset;
                cur.count += loc.count;
                cur.absorb_stamps(loc.first_seen, loc.last_seen);
            }
            _ => merged.push(loc),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn ev(device: &str, offset: u64, length: u64) -> ErrorEvent {
        ErrorEvent {
            timestamp: None,
            device: device.into(),
            operation: "READ".into(),
            offset,
            length,
        }
    }

    #[test]
    fn devices_keep_first_appearance_order() {
        let groups = group_by_device(vec![
            ev("ad1", 0, 512),
            ev("ad0", 0, 512),
            ev("ad1", 512, 512),
        ]);
        let names: Vec<&str> = groups.iter().map(|g| g.device.as_str()).collect();
        assert_eq!(names, ["ad1", "ad0"]);
        assert_eq!(groups[0].event_count(), 2);
    }

    #[test]
    fn identical_events_count_twice() {
        let locs = locations(&[ev("ad0", 4096, 512), ev("ad0", 4096, 512)], DedupPolicy::Exact);
        assert_eq!(locs.len(), 1);
        assert_eq!((locs[0].offset, locs[0].length, locs[0].count), (4096, 512, 2));
    }

    #[test]
    fn counts_sum_to_event_count() {
        let events: Vec<ErrorEvent> = (0..50u64)
            .map(|i| ev("ad0", (i % 7) * 512, 512 + (i % 3) * 512))
            .collect();
        for policy in [DedupPolicy::Exact, DedupPolicy::MergeOverlapping] {
            let total: usize = locations(&events, policy).iter().map(|l| l.count).sum();
            assert_eq!(total, events.len(), "{policy}");
        }
    }

    #[test]
    fn same_offset_different_length_is_two_locations() {
        let dev = DeviceErrors {
            device: "ad0".into(),
            events: vec![ev("ad0", 4096, 512), ev("ad0", 4096, 1024)],
        };
        assert_eq!(dev.locations(DedupPolicy::Exact).len(), 2);
        assert_eq!(dev.unique_offsets().into_iter().collect::<Vec<_>>(), [4096]);
    }

    #[test]
    fn merges_overlapping_and_adjacent_ranges() {
        let events = [
            ev("ad0", 8192, 512),
            ev("ad0", 0, 1024),
            ev("ad0", 512, 1024),
            ev("ad0", 1536, 512),
        ];
        let locs = locations(&events, DedupPolicy::MergeOverlapping);
        assert_eq!(locs.len(), 2);
        assert_eq!((locs[0].offset, locs[0].length, locs[0].count), (0, 2048, 3));
        assert_eq!((locs[1].offset, locs[1].length, locs[1].count), (8192, 512, 1));
    }

    #[test]
    fn tracks_first_and_last_seen() {
        let mut a = ev("ad0", 0, 512);
        a.timestamp = Some(datetime!(2024-10-12 03:14:07));
        let b = ev("ad0", 0, 512);
        let mut c = ev("ad0", 0, 512);
        c.timestamp = Some(datetime!(2024-10-11 01:00:00));

        let locs = locations(&[a, b, c], DedupPolicy::Exact);
        assert_eq!(locs[0].first_seen, Some(datetime!(2024-10-11 01:00:00)));
        assert_eq!(locs[0].last_seen, Some(datetime!(2024-10-12 03:14:07)));
    }

    #[test]
    fn dedup_from_str() {
        assert_eq!("exact".parse::<DedupPolicy>().unwrap(), DedupPolicy::Exact);
        assert_eq!(
            "merge-overlapping".parse::<DedupPolicy>().unwrap(),
            DedupPolicy::MergeOverlapping
        );
        assert!("fuzzy".parse::<DedupPolicy>().is_err());
    }
}
