// SPDX-License-Identifier: MIT

//! UFS/FFS helpers for blkmap: the `ffsinfo` dump parser, superblock layout
//! parameters and the offset to disk block translation.

pub mod addr;
pub mod dump;
pub mod error;
pub mod meta;

pub use addr::offset_to_disk_block;
pub use dump::{DumpGroup, DumpValue, parse_dump};
pub use error::*;
pub use meta::FfsMeta;

/// Parses an `ffsinfo` dump and extracts the superblock layout in one step.
pub fn meta_from_dump(text: &str) -> FfsResult<FfsMeta> {
    FfsMeta::from_dump(&parse_dump(text))
}
