// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};

use crate::{
    dump::{DumpGroup, DumpValue},
    error::{FfsError, FfsResult},
};

/// Name of the group holding the primary superblock in an `ffsinfo` dump.
pub const SBLOCK_GROUP: &str = "sblock";

/// Layout parameters of one UFS filesystem, read from its superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfsMeta {
    /// Filesystem block size in bytes (`fs_bsize`).
    pub bsize: u64,
    /// Fragment size in bytes (`fs_fsize`), when the dump carries it.
    pub fsize: Option<u64>,
    /// Fragments per block (`fs_frag`). Always a power of two.
    pub frag: u64,
    /// Shift converting filesystem fragment addresses to disk blocks (`fs_fsbtodb`).
    pub fsbtodb: u32,
    /// Mount point recorded in the superblock (`fs_fsmnt`).
    pub fsmnt: PathBuf,
}

impl FfsMeta {
    pub fn new<P: Into<PathBuf>>(bsize: u64, frag: u64, fsbtodb: u32, fsmnt: P) -> FfsResult<Self> {
        let meta = Self {
            bsize,
            fsize: None,
            frag,
            fsbtodb,
            fsmnt: fsmnt.into(),
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Extracts the layout from a parsed dump.
    ///
    /// Fields are looked up in the `sblock` group when the dump has one,
    /// otherwise at the top level.
    pub fn from_dump(root: &DumpGroup) -> FfsResult<Self> {
        let sb = root.group(SBLOCK_GROUP).unwrap_or(root);

        let bsize = positive(sb, "bsize")?;
        let frag = positive(sb, "frag")?;
        let fsbtodb = int_field(sb, "fsbtodb")?;
        if !(0..64).contains(&fsbtodb) {
            return Err(FfsError::OutOfRange {
                field: "fsbtodb",
                value: fsbtodb,
            });
        }
        let fsize = match sb.get("fsize") {
            Some(_) => Some(positive(sb, "fsize")?),
            None => None,
        };
        let fsmnt = match sb.get("fsmnt") {
            Some(DumpValue::Str(s)) => PathBuf::from(s),
            Some(_) => return Err(FfsError::WrongType("fsmnt")),
            None => return Err(FfsError::MissingField("fsmnt")),
        };

        let meta = Self {
            bsize,
            fsize,
            frag,
            fsbtodb: fsbtodb as u32,
            fsmnt,
        };
        meta.validate()?;
        Ok(meta)
    }

    pub fn validate(&self) -> FfsResult {
        if self.bsize == 0 {
            return Err(FfsError::OutOfRange {
                field: "bsize",
                value: 0,
            });
        }
        if !self.frag.is_power_of_two() {
            return Err(FfsError::NotPowerOfTwo {
                field: "frag",
                value: self.frag as i64,
            });
        }
        if self.fsbtodb >= u64::BITS {
            return Err(FfsError::OutOfRange {
                field: "fsbtodb",
                value: self.fsbtodb as i64,
            });
        }
        Ok(())
    }

    /// Replaces the recorded mount point, which may be stale.
    pub fn with_mountpoint<P: Into<PathBuf>>(mut self, mountpoint: P) -> Self {
        self.fsmnt = mountpoint.into();
        self
    }

    pub fn mountpoint(&self) -> &Path {
        &self.fsmnt
    }
}

fn int_field(group: &DumpGroup, field: &'static str) -> FfsResult<i64> {
    match group.get(field) {
        Some(DumpValue::Int(v)) => Ok(*v),
        Some(_) => Err(FfsError::WrongType(field)),
        None => Err(FfsError::MissingField(field)),
    }
}

fn positive(group: &DumpGroup, field: &'static str) -> FfsResult<u64> {
    let value = int_field(group, field)?;
    if value <= 0 {
        return Err(FfsError::OutOfRange { field, value });
    }
    Ok(value as u64)
}
