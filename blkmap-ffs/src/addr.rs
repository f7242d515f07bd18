// SPDX-License-Identifier: MIT

//! Block address arithmetic, after the macros in `ufs/ffs/fs.h`.

use crate::meta::FfsMeta;

impl FfsMeta {
    /// Filesystem fragment address to disk block (`fsbtodb`).
    #[inline]
    pub fn fs_to_disk(&self, fsb: u64) -> u64 {
        fsb << self.fsbtodb
    }

    /// Disk block to filesystem fragment address (`dbtofsb`).
    #[inline]
    pub fn disk_to_fs(&self, db: u64) -> u64 {
        db >> self.fsbtodb
    }

    /// Fragment index within its block (`fragnum`).
    #[inline]
    pub fn frag_offset(&self, fsb: u64) -> u64 {
        fsb & (self.frag - 1)
    }

    /// Rounds down to the start of the block (`blknum`).
    #[inline]
    pub fn block_floor(&self, fsb: u64) -> u64 {
        fsb & !(self.frag - 1)
    }

    /// See [`offset_to_disk_block`].
    pub fn disk_block_of(&self, offset: u64, sector_size: u64) -> u64 {
        offset_to_disk_block(offset, sector_size, self)
    }
}

/// Translates a byte offset on the device into the disk block holding it.
///
/// The offset is first reduced to a sector-granular logical block number,
/// floored to its block boundary, moved into fragment address space, given
/// back its fragment remainder and finally converted back to a disk block.
///
/// `sector_size` must be non-zero.
pub fn offset_to_disk_block(offset: u64, sector_size: u64, meta: &FfsMeta) -> u64 {
    let lbn = offset / sector_size;
    let db = meta.block_floor(lbn);
    let frag = meta.frag_offset(lbn);
    let fsb = meta.disk_to_fs(db) + frag;
    let block = meta.fs_to_disk(fsb);

    log::trace!(
        "off {offset} blk +{} lbn {lbn} db {db} fsb {fsb} fragnum {frag} -> db {block}",
        offset % meta.bsize
    );

    block
}
