// SPDX-License-Identifier: MIT

//! Host side of blkmap: every external tool it drives (`sysctl`, `ffsinfo`,
//! `fsdb`, `find`), behind the [`HostOps`] seam, with per-device caches.

#[macro_use]
pub mod macros;

pub mod cache;
pub mod error;
pub mod find;
pub mod fsdb;
pub mod geom;
pub mod host;
pub mod runner;
pub mod superblock;
pub mod tools;

#[cfg(feature = "scripted")]
pub mod scripted;

pub use cache::DeviceCache;
pub use error::*;
pub use find::{PathRecord, PathResolution, split_print0};
pub use fsdb::{
    BatchFailure, BlockResolution, FINDBLK_MAX_BLOCKS, FindBlkRequest, join_blocks,
    parse_findblk_output, plan_batches,
};
pub use geom::{DeviceGeometry, GeomTree};
pub use host::Host;
pub use runner::{DEFAULT_TIMEOUT, HostOps, SystemHost, ToolOutput, ToolRequest};
pub use tools::ToolSet;
