// Chain replication: genesis bootstrap, fork detection against the
// trailing window, common-ancestor search, rollback, and forward sync
// with three download strategies (ranged, per-block, paged dump).

use super::Replicator;
use crate::config::{sync_logging_enabled, ALL_BLOCKS_PAGE_LIMIT, BLOCKS_RANGE_MAX, FORK_CHECK_WINDOW};
use crate::core::error::SyncResult;
use log::{debug, info, warn};
use nodesync_common::block::Block;

#[derive(Debug, Default, Clone)]
pub struct ChainSyncReport {
    pub source: String,
    pub start_height: u64,
    pub end_height: u64,
    pub blocks_inserted: u64,
    pub blocks_rolled_back: u64,
    pub fork_common_ancestor: Option<u64>,
}

impl Replicator {
    /// One full chain pass against `source`. Inserts are strictly
    /// ascending; a failure at height h leaves `[0..h-1]` intact and the
    /// next round resumes from the stored tip.
    pub async fn sync_chain(&self, source: &str) -> SyncResult<ChainSyncReport> {
        let mut report = ChainSyncReport {
            source: source.to_string(),
            ..Default::default()
        };

        if self.ensure_genesis(source).await? {
            report.blocks_inserted += 1;
        }

        let local_tip = self.store().tip_height().await?;
        let remote_tip = self.client().remote_tip_height(source).await?;
        let Some(remote_tip) = remote_tip else {
            debug!("{} did not report a tip, skipping chain sync", source);
            return Ok(report);
        };

        let mut local_tip = match local_tip {
            Some(tip) => tip,
            None => {
                // genesis fetch above failed to land anything
                debug!("local chain is empty and genesis is unavailable from {}", source);
                return Ok(report);
            }
        };
        report.start_height = local_tip;

        if remote_tip > local_tip {
            if let Some(fork_height) = self.find_fork(source, local_tip).await? {
                let ancestor = self.find_common_ancestor(source, fork_height).await?;
                info!(
                    "fork against {} at height {}, rolling back to common ancestor {}",
                    source, fork_height, ancestor
                );
                report.blocks_rolled_back = self.store().delete_blocks_above(ancestor).await?;
                self.store().delete_orphan_transactions().await?;
                report.fork_common_ancestor = Some(ancestor);
                local_tip = ancestor;
            }
        }

        if remote_tip > local_tip {
            report.blocks_inserted += self
                .download_forward(source, local_tip + 1, remote_tip)
                .await?;
        }

        report.end_height = self.store().tip_height().await?.unwrap_or(0);
        if sync_logging_enabled() || report.blocks_inserted > 0 {
            info!(
                "chain sync from {}: +{} blocks, -{} rolled back, tip {}",
                source, report.blocks_inserted, report.blocks_rolled_back, report.end_height
            );
        }
        Ok(report)
    }

    /// Targeted blocks-only pass, used by the inbound event intake.
    pub async fn sync_blocks_only(&self, source: &str) -> SyncResult<ChainSyncReport> {
        self.sync_chain(source).await
    }

    /// Fetch and insert block 0 when the local chain is empty.
    async fn ensure_genesis(&self, source: &str) -> SyncResult<bool> {
        if self.store().block_hash_at(0).await?.is_some() {
            return Ok(false);
        }
        match self.client().get_block(source, 0).await? {
            Some(genesis) => {
                let inserted = self.store().insert_block_if_absent(&genesis).await?;
                if inserted {
                    info!("imported genesis block from {}", source);
                }
                Ok(inserted)
            }
            None => {
                warn!("{} does not serve a genesis block", source);
                Ok(false)
            }
        }
    }

    /// Compare the trailing window `[tip-5 ..= tip]` against the source.
    /// Returns the first mismatching height, if any.
    async fn find_fork(&self, source: &str, local_tip: u64) -> SyncResult<Option<u64>> {
        let window_start = local_tip.saturating_sub(FORK_CHECK_WINDOW);
        let local = self
            .store()
            .block_hashes_between(window_start, local_tip)
            .await?;
        let mut remote = self
            .client()
            .get_block_hashes_range(source, window_start, local_tip)
            .await?;
        remote.sort_by_key(|row| row.height);

        for row in remote {
            if let Some(local_hash) = local.get(&row.height) {
                if *local_hash != row.hash {
                    return Ok(Some(row.height));
                }
            }
        }
        Ok(None)
    }

    /// Linear scan from genesis until the first mismatch; the last
    /// matching height is the common ancestor. Chunked range fetches keep
    /// the request count bounded.
    async fn find_common_ancestor(&self, source: &str, upto: u64) -> SyncResult<u64> {
        let mut ancestor = 0u64;
        let mut start = 0u64;

        while start <= upto {
            let end = (start + BLOCKS_RANGE_MAX - 1).min(upto);
            let local = self.store().block_hashes_between(start, end).await?;
            let remote = self
                .client()
                .get_block_hashes_range(source, start, end)
                .await?;

            let mut remote_sorted = remote;
            remote_sorted.sort_by_key(|row| row.height);

            for row in &remote_sorted {
                match local.get(&row.height) {
                    Some(local_hash) if *local_hash == row.hash => ancestor = row.height,
                    _ => return Ok(ancestor),
                }
            }

            if remote_sorted.is_empty() {
                break;
            }
            start = end + 1;
        }

        Ok(ancestor)
    }

    /// Forward sync `[start ..= target]`: ranged download first, per-block
    /// fetches when the peer does not support ranges, and the paged
    /// `get_all_blocks` dump as a last resort.
    async fn download_forward(&self, source: &str, start: u64, target: u64) -> SyncResult<u64> {
        let mut inserted = 0u64;
        let mut height = start;

        while height <= target {
            let end = (height + BLOCKS_RANGE_MAX - 1).min(target);
            let mut batch = self.client().get_blocks_range(source, height, end).await?;
            batch.sort_by_key(|b| b.height);
            batch.retain(|b| b.height >= height && b.height <= end);

            // a batch that does not begin at the requested height would
            // punch a hole into the chain; refetch block by block
            if batch.first().map(|b| b.height) != Some(height) {
                batch = self.download_single_blocks(source, height, end).await?;
            }
            if batch.is_empty() {
                debug!(
                    "{} serves neither ranged nor single blocks for {}..={}, trying paged dump",
                    source, height, end
                );
                inserted += self.download_paged(source, height, target).await?;
                return Ok(inserted);
            }

            let (count, last) = self.insert_ascending(&batch).await?;
            inserted += count;
            match last {
                Some(reached) if reached >= end => height = end + 1,
                Some(reached) => {
                    // stopped mid-batch; the next round resumes from the tip
                    warn!("forward sync stopped early at height {}", reached);
                    return Ok(inserted);
                }
                None => return Ok(inserted),
            }
        }

        Ok(inserted)
    }

    async fn download_single_blocks(
        &self,
        source: &str,
        start: u64,
        end: u64,
    ) -> SyncResult<Vec<Block>> {
        let mut out = Vec::new();
        for height in start..=end {
            match self.client().get_block(source, height).await? {
                Some(block) => out.push(block),
                None => break,
            }
        }
        Ok(out)
    }

    async fn download_paged(&self, source: &str, start: u64, target: u64) -> SyncResult<u64> {
        let mut wanted: Vec<Block> = Vec::new();
        let mut page = 1u64;
        // explorers page newest-first; bound the walk to what the span
        // could possibly need, plus slack for reordering
        let max_pages = (target / ALL_BLOCKS_PAGE_LIMIT) + 2;

        while page <= max_pages {
            let (blocks, pagination) = self
                .client()
                .get_all_blocks(source, page, ALL_BLOCKS_PAGE_LIMIT)
                .await?;
            if blocks.is_empty() {
                break;
            }

            wanted.extend(
                blocks
                    .into_iter()
                    .filter(|b| b.height >= start && b.height <= target),
            );

            let covered = wanted.len() as u64 >= target - start + 1;
            let has_more = pagination.map(|p| p.has_more).unwrap_or(true);
            if covered || !has_more {
                break;
            }
            page += 1;
        }

        wanted.sort_by_key(|b| b.height);
        wanted.dedup_by_key(|b| b.height);
        let (count, _) = self.insert_ascending(&wanted).await?;
        Ok(count)
    }

    /// Insert blocks in ascending height order, stopping at the first
    /// discontinuity or broken parent link so a partial batch never
    /// leaves holes. Returns the insert count and the last height that
    /// was actually processed.
    async fn insert_ascending(&self, blocks: &[Block]) -> SyncResult<(u64, Option<u64>)> {
        let mut inserted = 0u64;
        let mut previous: Option<&Block> = None;

        for block in blocks {
            if let Some(prev) = previous {
                if block.height != prev.height + 1 {
                    warn!(
                        "non-contiguous batch: expected height {}, got {}",
                        prev.height + 1,
                        block.height
                    );
                    break;
                }
                if block.parent_hash != prev.hash {
                    warn!(
                        "broken parent link at height {}: {} does not extend {}",
                        block.height, block.parent_hash, prev.hash
                    );
                    break;
                }
            }
            if self.store().insert_block_if_absent(block).await? {
                inserted += 1;
            }
            previous = Some(block);
        }

        Ok((inserted, previous.map(|b| b.height)))
    }
}
