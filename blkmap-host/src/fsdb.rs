// SPDX-License-Identifier: MIT

//! Block to inode resolution through interactive `fsdb` sessions.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{HostError, HostResult},
    host::Host,
    runner::HostOps,
};

/// Most block numbers `fsdb`'s `findblk` accepts per command.
pub const FINDBLK_MAX_BLOCKS: usize = 32;

const OWNER_MARKER: &str = ": data block of inode ";

/// One `findblk` command against one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindBlkRequest {
    device: String,
    blocks: Vec<u64>,
}

impl FindBlkRequest {
    pub fn new<S: Into<String>>(device: S, blocks: Vec<u64>) -> HostResult<Self> {
        if blocks.is_empty() || blocks.len() > FINDBLK_MAX_BLOCKS {
            return Err(HostError::Invalid(format!(
                "findblk takes 1 to {FINDBLK_MAX_BLOCKS} blocks, got {}",
                blocks.len()
            )));
        }
        Ok(Self {
            device: device.into(),
            blocks,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn blocks(&self) -> &[u64] {
        &self.blocks
    }

    /// Session input: exactly one lookup, then leave.
    pub fn script(&self) -> String {
        format!("findblk {}\nexit\n", join_blocks(&self.blocks))
    }
}

/// Space separated block numbers, as `findblk` takes them.
pub fn join_blocks(blocks: &[u64]) -> String {
    blocks
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits blocks into `findblk` sized batches, keeping their order.
///
/// Blocks arrive in error offset order; two offsets landing in the same
/// block both keep their slot.
pub fn plan_batches(blocks: &[u64], batch_size: usize) -> Vec<Vec<u64>> {
    let size = batch_size.clamp(1, FINDBLK_MAX_BLOCKS);
    blocks.chunks(size).map(<[u64]>::to_vec).collect()
}

/// Extracts `<block>: data block of inode <inode>` pairs.
///
/// Prompts and any other chatter are ignored, so the session output can be
/// handed over as is.
pub fn parse_findblk_output(text: &str) -> BTreeMap<u64, u64> {
    text.lines().filter_map(parse_owner_line).collect()
}

fn parse_owner_line(line: &str) -> Option<(u64, u64)> {
    let at = line.find(OWNER_MARKER)?;
    let head = &line[..at];
    let tail = &line[at + OWNER_MARKER.len()..];

    let block = &head[head.trim_end_matches(|c: char| c.is_ascii_digit()).len()..];
    let inode_len = tail.len() - tail.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let inode = &tail[..inode_len];

    Some((block.parse().ok()?, inode.parse().ok()?))
}

/// A batch whose session failed and contributed no owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub blocks: Vec<u64>,
    pub error: HostError,
}

/// Outcome of resolving a block set across all batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResolution {
    /// Blocks queried, one entry per `fsdb` session, in invocation order.
    pub batches: Vec<Vec<u64>>,
    /// Block -> owning inode. Unowned blocks are absent.
    pub owners: BTreeMap<u64, u64>,
    pub failures: Vec<BatchFailure>,
}

impl BlockResolution {
    /// Distinct owning inodes, ascending.
    pub fn inodes(&self) -> BTreeSet<u64> {
        self.owners.values().copied().collect()
    }

    /// Inverse map: inode -> its implicated blocks, ascending.
    pub fn blocks_by_inode(&self) -> BTreeMap<u64, Vec<u64>> {
        let mut by_inode: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for (&block, &inode) in &self.owners {
            by_inode.entry(inode).or_default().push(block);
        }
        by_inode
    }
}

impl<H: HostOps> Host<H> {
    /// Runs one `fsdb` session for one batch.
    pub fn find_block_owners(&self, request: &FindBlkRequest) -> HostResult<BTreeMap<u64, u64>> {
        let tool = self.tools.fsdb_request(request);
        let output = self.ops.run(&tool)?.check(&tool.program)?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_findblk_output(&text))
    }

    /// Resolves every block of `device`, batch by batch.
    ///
    /// A failing batch is recorded and skipped; the remaining batches still
    /// run.
    pub fn resolve_blocks(
        &self,
        device: &str,
        blocks: &[u64],
        batch_size: usize,
    ) -> BlockResolution {
        let mut resolution = BlockResolution::default();

        for batch in plan_batches(blocks, batch_size) {
            let result = FindBlkRequest::new(device, batch.clone())
                .and_then(|request| self.find_block_owners(&request));

            match result {
                Ok(owners) => {
                    log::debug!("{device}: batch of {} -> {} owned", batch.len(), owners.len());
                    resolution.owners.extend(owners);
                }
                Err(error) => {
                    log::warn!("{device}: findblk {:?} failed: {error}", batch);
                    resolution.failures.push(BatchFailure {
                        blocks: batch.clone(),
                        error,
                    });
                }
            }
            resolution.batches.push(batch);
        }

        resolution
    }
}
