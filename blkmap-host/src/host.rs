// SPDX-License-Identifier: MIT

use std::sync::OnceLock;

use blkmap_ffs::FfsMeta;

use crate::{
    cache::DeviceCache,
    error::HostResult,
    geom::{DeviceGeometry, GeomTree},
    runner::{HostOps, SystemHost},
    tools::ToolSet,
};

/// Entry point to every external lookup, with the per-process caches.
///
/// Geometry and superblock lookups are memoized per device, failures
/// included: a device that could not be described once is not retried.
#[derive(Debug)]
pub struct Host<H: HostOps = SystemHost> {
    pub(crate) ops: H,
    pub(crate) tools: ToolSet,
    pub(crate) topology: OnceLock<HostResult<GeomTree>>,
    pub(crate) geometry: DeviceCache<HostResult<DeviceGeometry>>,
    pub(crate) superblocks: DeviceCache<HostResult<FfsMeta>>,
}

impl Host<SystemHost> {
    pub fn system(tools: ToolSet) -> Self {
        Self::new(SystemHost, tools)
    }
}

impl<H: HostOps> Host<H> {
    pub fn new(ops: H, tools: ToolSet) -> Self {
        Self {
            ops,
            tools,
            topology: OnceLock::new(),
            geometry: DeviceCache::new(),
            superblocks: DeviceCache::new(),
        }
    }

    pub fn ops(&self) -> &H {
        &self.ops
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }
}
