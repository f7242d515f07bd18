// SPDX-License-Identifier: MIT

use blkmap_ffs::FfsMeta;

use crate::{
    error::{HostError, HostResult},
    host::Host,
    runner::HostOps,
};

impl<H: HostOps> Host<H> {
    /// Superblock layout of `device`, from one `ffsinfo` run per process.
    pub fn superblock(&self, device: &str) -> HostResult<FfsMeta> {
        self.superblocks
            .get_or_init(device, || self.load_superblock(device))
    }

    fn load_superblock(&self, device: &str) -> HostResult<FfsMeta> {
        let request = self.tools.ffsinfo_request(device);
        let output = self.ops.run(&request)?.check(&request.program)?;
        let dump = output.stdout_str(&request.program)?;

        let meta = blkmap_ffs::meta_from_dump(dump).map_err(|source| HostError::Superblock {
            device: device.to_string(),
            source,
        })?;

        log::debug!(
            "{device}: bsize {} frag {} fsbtodb {} fsmnt {}",
            meta.bsize,
            meta.frag,
            meta.fsbtodb,
            meta.fsmnt.display()
        );

        Ok(meta)
    }
}
