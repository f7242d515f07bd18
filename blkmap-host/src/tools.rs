// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HostError, HostResult};
use crate::fsdb::FindBlkRequest;
use crate::runner::{DEFAULT_TIMEOUT, ToolRequest};

/// Names (or paths) of the external tools and where raw devices live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    pub ffsinfo: String,
    pub fsdb: String,
    pub find: String,
    pub sysctl: String,
    pub dev_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            ffsinfo: "ffsinfo".into(),
            fsdb: "fsdb".into(),
            find: "find".into(),
            sysctl: "sysctl".into(),
            dev_dir: PathBuf::from("/dev"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ToolSet {
    pub fn required_binaries(&self) -> [&str; 4] {
        [
            self.sysctl.as_str(),
            self.ffsinfo.as_str(),
            self.fsdb.as_str(),
            self.find.as_str(),
        ]
    }

    pub fn validate_binaries(&self) -> HostResult {
        let missing: Vec<String> = self
            .required_binaries()
            .iter()
            .copied()
            .filter(|b| which::which(b).is_err())
            .map(str::to_string)
            .collect();

        if !missing.is_empty() {
            return Err(HostError::MissingBinaries(missing));
        }

        Ok(())
    }

    pub fn raw_device(&self, device: &str) -> PathBuf {
        self.dev_dir.join(device)
    }

    /// `sysctl -b kern.geom.confxml`
    pub fn geom_confxml_request(&self) -> ToolRequest {
        ToolRequest::new(&self.sysctl, crate::args!["-b", "kern.geom.confxml"])
            .with_timeout(self.timeout)
    }

    /// `ffsinfo -l 1 <device>`
    pub fn ffsinfo_request(&self, device: &str) -> ToolRequest {
        ToolRequest::new(&self.ffsinfo, crate::args!["-l", 1, device]).with_timeout(self.timeout)
    }

    /// `fsdb -r /dev/<device>` fed with one findblk command and `exit`.
    pub fn fsdb_request(&self, request: &FindBlkRequest) -> ToolRequest {
        let dev = self.raw_device(request.device());
        ToolRequest::new(&self.fsdb, crate::args!["-r", dev.display()])
            .with_stdin(request.script())
            .with_timeout(self.timeout)
    }

    /// `find -x <mnt> ( -inum a -or -inum b ) -print0`
    pub fn find_request(&self, mountpoint: &Path, inodes: &BTreeSet<u64>) -> ToolRequest {
        let mut args = crate::args!["-x", mountpoint.display(), "("];
        for (i, inode) in inodes.iter().enumerate() {
            if i > 0 {
                args.push("-or".into());
            }
            args.push("-inum".into());
            args.push(inode.to_string());
        }
        args.extend(crate::args![")", "-print0"]);
        ToolRequest::new(&self.find, args).with_timeout(self.timeout)
    }
}
