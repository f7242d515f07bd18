// SPDX-License-Identifier: MIT

//! Inode to path resolution with `find -inum`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::{
    error::{HostError, HostResult},
    host::Host,
    runner::HostOps,
};

/// A file implicated by failed blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub path: PathBuf,
    pub inode: u64,
    /// Implicated blocks owned by `inode`, ascending.
    pub blocks: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolution {
    /// Sorted by path.
    pub records: Vec<PathRecord>,
    /// Paths returned by the search that could not be stat'ed.
    pub skipped: Vec<HostError>,
}

/// Splits `-print0` output, dropping empty entries.
pub fn split_print0(stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .map(bytes_to_path)
        .collect()
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

impl<H: HostOps> Host<H> {
    /// Paths under `mountpoint` whose inode is one of `inodes`.
    ///
    /// Nothing is spawned for an empty inode set. A non-zero exit with some
    /// output (typically unreadable directories) keeps the paths found.
    pub fn find_paths(&self, mountpoint: &Path, inodes: &BTreeSet<u64>) -> HostResult<Vec<PathBuf>> {
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.tools.find_request(mountpoint, inodes);
        let output = self.ops.run(&request)?;

        if !output.success() {
            if output.stdout.is_empty() {
                return output.check(&request.program).map(|_| Vec::new());
            }
            log::warn!(
                "`{}` exited with {:?}, keeping partial results",
                request.program,
                output.code
            );
        }

        Ok(split_print0(&output.stdout))
    }

    /// Resolves owners to paths, re-associating each path with its blocks
    /// through its own inode number.
    pub fn resolve_paths(
        &self,
        mountpoint: &Path,
        blocks_by_inode: &BTreeMap<u64, Vec<u64>>,
    ) -> HostResult<PathResolution> {
        let inodes: BTreeSet<u64> = blocks_by_inode.keys().copied().collect();
        let mut paths = self.find_paths(mountpoint, &inodes)?;
        paths.sort();

        let mut resolution = PathResolution::default();
        for path in paths {
            match self.ops.inode_of(&path) {
                Ok(inode) => {
                    let blocks = blocks_by_inode.get(&inode).cloned().unwrap_or_default();
                    resolution.records.push(PathRecord {
                        path,
                        inode,
                        blocks,
                    });
                }
                Err(error) => {
                    log::warn!("{error}");
                    resolution.skipped.push(error);
                }
            }
        }

        Ok(resolution)
    }
}
