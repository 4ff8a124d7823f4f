//! Chunked `eth_getLogs` scanning.
//!
//! A scan over `[from, to]` is split into consecutive sub-ranges of at most `chunk_blocks`
//! blocks and queried strictly in ascending order. The scanner only advances past a
//! sub-range after its query succeeded, so a caller that drains it without error has
//! covered the whole range with no gaps and no overlap.

use crate::error::RpcError;
use crate::utils::rpc::{LogFilter, RpcClient, RpcLog};
use alloy::primitives::{Address, B256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// Iterator over the sub-ranges of `[from, to]`; yields nothing when `from > to`.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    next: Option<u64>,
    to: u64,
    chunk_blocks: u64,
}

pub fn chunk_ranges(from: u64, to: u64, chunk_blocks: u64) -> ChunkRanges {
    ChunkRanges {
        next: (from <= to).then_some(from),
        to,
        chunk_blocks: chunk_blocks.max(1),
    }
}

impl Iterator for ChunkRanges {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        let from = self.next?;
        let to = from.saturating_add(self.chunk_blocks - 1).min(self.to);
        self.next = if to >= self.to { None } else { Some(to + 1) };
        Some(BlockRange { from, to })
    }
}

#[derive(Debug, Clone)]
pub struct LogBatch {
    pub range: BlockRange,
    pub logs: Vec<RpcLog>,
}

/// Lazy scan over one contract and topic filter.
pub struct LogScanner<'a> {
    client: &'a RpcClient,
    address: Address,
    topics: Vec<Option<B256>>,
    ranges: ChunkRanges,
    pending: Option<BlockRange>,
    batches: u64,
}

impl<'a> LogScanner<'a> {
    pub fn new(
        client: &'a RpcClient,
        address: Address,
        topics: Vec<Option<B256>>,
        from_block: u64,
        to_block: u64,
        chunk_blocks: u64,
    ) -> Self {
        Self {
            client,
            address,
            topics,
            ranges: chunk_ranges(from_block, to_block, chunk_blocks),
            pending: None,
            batches: 0,
        }
    }

    /// Query the next sub-range. A failed sub-range stays pending, so calling again
    /// retries it; `restart_from` moves the scan elsewhere instead.
    pub async fn next_batch(&mut self) -> Option<Result<LogBatch, RpcError>> {
        let range = match self.pending {
            Some(range) => range,
            None => {
                let range = self.ranges.next()?;
                self.pending = Some(range);
                range
            }
        };

        let filter = LogFilter {
            address: self.address,
            topics: self.topics.clone(),
            from_block: range.from,
            to_block: range.to,
        };
        match self.client.get_logs(&filter).await {
            Ok(logs) => {
                self.pending = None;
                self.batches = self.batches.saturating_add(1);
                tracing::debug!(
                    "[SCAN] chain={} contract={:#x} blocks=[{}..={}] logs={}",
                    self.client.chain(),
                    self.address,
                    range.from,
                    range.to,
                    logs.len()
                );
                Some(Ok(LogBatch { range, logs }))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Sub-range that is queued or failed and not yet covered.
    pub fn pending_range(&self) -> Option<BlockRange> {
        self.pending
    }

    /// Drop whatever is pending and continue from `from_block`, keeping the original end.
    pub fn restart_from(&mut self, from_block: u64) {
        let to = self.ranges.to;
        self.ranges = chunk_ranges(from_block, to, self.ranges.chunk_blocks);
        self.pending = None;
    }

    pub fn batches_completed(&self) -> u64 {
        self.batches
    }
}
