// SPDX-License-Identifier: MIT

use core::fmt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use blkmap_host::{DEFAULT_TIMEOUT, FINDBLK_MAX_BLOCKS, ToolSet};
use serde::{Deserialize, Deserializer};

use crate::{error::ConfigError, group::DedupPolicy, timestamp::YearPolicy};

/// Where the sector size used to turn byte offsets into sectors comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SectorSize {
    /// The GEOM provider's `sectorsize`.
    #[default]
    Provider,
    Fixed(u64),
}

impl SectorSize {
    fn check(self, key: &'static str) -> Result<Self, ConfigError> {
        match self {
            SectorSize::Fixed(n) if n == 0 || !n.is_power_of_two() => Err(ConfigError::invalid(
                key,
                format!("{n} is not a non-zero power of two"),
            )),
            other => Ok(other),
        }
    }
}

impl FromStr for SectorSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("provider") {
            return Ok(SectorSize::Provider);
        }
        s.parse::<u64>()
            .map(SectorSize::Fixed)
            .map_err(|_| {
                ConfigError::invalid(
                    "sector_size",
                    format!("expected 'provider' or a byte count, got '{s}'"),
                )
            })?
            .check("sector_size")
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorSize::Provider => f.write_str("provider"),
            SectorSize::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl<'de> Deserialize<'de> for SectorSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SectorSizeVisitor;

        impl<'de> serde::de::Visitor<'de> for SectorSizeVisitor {
            type Value = SectorSize;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("'provider' or a sector size in bytes like 512")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let n = u64::try_from(value)
                    .map_err(|_| E::custom(format!("sector size cannot be negative ({value})")))?;
                self.visit_u64(n)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(SectorSize::Fixed(value))
            }
        }

        deserializer.deserialize_any(SectorSizeVisitor)
    }
}

/// External tool names or paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolNames {
    pub ffsinfo: String,
    pub fsdb: String,
    pub find: String,
    pub sysctl: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        let tools = ToolSet::default();
        Self {
            ffsinfo: tools.ffsinfo,
            fsdb: tools.fsdb,
            find: tools.find,
            sysctl: tools.sysctl,
        }
    }
}

/// Per-device settings taking precedence over the global ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceOverride {
    pub sector_size: Option<u64>,
    /// Replaces the superblock's last mount point (`fsmnt`).
    pub mountpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub year: YearPolicy,
    pub dedup: DedupPolicy,
    pub sector_size: SectorSize,
    /// Blocks per `findblk` command.
    pub batch_size: usize,
    pub tool_timeout_secs: u64,
    pub dev_dir: PathBuf,
    pub tools: ToolNames,
    pub devices: BTreeMap<String, DeviceOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            year: YearPolicy::default(),
            dedup: DedupPolicy::default(),
            sector_size: SectorSize::default(),
            batch_size: FINDBLK_MAX_BLOCKS,
            tool_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            dev_dir: PathBuf::from("/dev"),
            tools: ToolNames::default(),
            devices: BTreeMap::new(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Config = content.parse()?;
        log::debug!("config loaded from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=FINDBLK_MAX_BLOCKS).contains(&self.batch_size) {
            return Err(ConfigError::invalid(
                "batch_size",
                format!("must be within 1..={FINDBLK_MAX_BLOCKS} (got {})", self.batch_size),
            ));
        }
        if self.tool_timeout_secs == 0 {
            return Err(ConfigError::invalid("tool_timeout_secs", "must be non-zero"));
        }
        self.sector_size.check("sector_size")?;
        for (device, over) in &self.devices {
            if let Some(n) = over.sector_size {
                SectorSize::Fixed(n).check("devices.sector_size").map_err(|e| match e {
                    ConfigError::Invalid { key, reason } => {
                        ConfigError::invalid(key, format!("{device}: {reason}"))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn tool_set(&self) -> ToolSet {
        ToolSet {
            ffsinfo: self.tools.ffsinfo.clone(),
            fsdb: self.tools.fsdb.clone(),
            find: self.tools.find.clone(),
            sysctl: self.tools.sysctl.clone(),
            dev_dir: self.dev_dir.clone(),
            timeout: self.timeout(),
        }
    }

    /// Device override, then global setting.
    pub fn sector_size_for(&self, device: &str) -> SectorSize {
        self.devices
            .get(device)
            .and_then(|d| d.sector_size)
            .map(SectorSize::Fixed)
            .unwrap_or(self.sector_size)
    }

    pub fn mountpoint_for(&self, device: &str) -> Option<&Path> {
        self.devices.get(device)?.mountpoint.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.tool_timeout_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config() {
        let config: Config = r#"
year = 2023
dedup = "merge-overlapping"
sector_size = "provider"
batch_size = 16
tool_timeout_secs = 30
dev_dir = "/tmp/dev"

[tools]
fsdb = "/usr/local/sbin/fsdb"

[devices.ad0s1d]
sector_size = 512
mountpoint = "/usr"
"#
        .parse()
        .unwrap();

        assert_eq!(config.year, YearPolicy::Fixed(2023));
        assert_eq!(config.dedup, DedupPolicy::MergeOverlapping);
        assert_eq!(config.sector_size_for("ad0s1d"), SectorSize::Fixed(512));
        assert_eq!(config.sector_size_for("ad1"), SectorSize::Provider);
        assert_eq!(config.mountpoint_for("ad0s1d"), Some(Path::new("/usr")));
        assert_eq!(config.mountpoint_for("ad1"), None);

        let tools = config.tool_set();
        assert_eq!(tools.fsdb, "/usr/local/sbin/fsdb");
        assert_eq!(tools.find, "find");
        assert_eq!(tools.raw_device("ad0s1d"), PathBuf::from("/tmp/dev/ad0s1d"));
        assert_eq!(tools.timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn string_and_integer_forms() {
        let a: Config = "year = \"rolling\"\nsector_size = 4096".parse().unwrap();
        assert_eq!(a.year, YearPolicy::Rolling);
        assert_eq!(a.sector_size, SectorSize::Fixed(4096));

        let b: Config = "year = \"2022\"\nsector_size = \"512\"".parse().unwrap();
        assert_eq!(b.year, YearPolicy::Fixed(2022));
        assert_eq!(b.sector_size, SectorSize::Fixed(512));
    }

    #[test]
    fn validation_rules() {
        let bad_batch = Config {
            batch_size: 33,
            ..Default::default()
        };
        assert!(matches!(
            bad_batch.validate(),
            Err(ConfigError::Invalid { key: "batch_size", .. })
        ));

        let bad_timeout = Config {
            tool_timeout_secs: 0,
            ..Default::default()
        };
        assert!(bad_timeout.validate().is_err());

        let bad_sector: Config = "sector_size = 600".parse().unwrap();
        assert!(bad_sector.validate().is_err());

        let mut bad_device = Config::default();
        bad_device.devices.insert(
            "ad0".into(),
            DeviceOverride {
                sector_size: Some(0),
                mountpoint: None,
            },
        );
        let err = bad_device.validate().unwrap_err();
        assert!(err.to_string().contains("ad0"), "{err}");
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            "colour = true".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
        assert!("dedup = \"fuzzy\"".parse::<Config>().is_err());
        assert!("sector_size = -512".parse::<Config>().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blkmap.toml");
        std::fs::write(&path, "batch_size = 8\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().batch_size, 8);

        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn sector_size_from_str() {
        assert_eq!("provider".parse::<SectorSize>().unwrap(), SectorSize::Provider);
        assert_eq!("4096".parse::<SectorSize>().unwrap(), SectorSize::Fixed(4096));
        assert!("0".parse::<SectorSize>().is_err());
        assert!("abc".parse::<SectorSize>().is_err());
    }
}
