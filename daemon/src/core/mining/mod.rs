// PoS mining loop.
//
// State machine per tick:
// IDLE -> SYNC_GUARD -> LEADER_CHECK -> (MINE | WAIT) -> BROADCAST ->
// VERIFY -> IDLE. The loop never mines ahead of the known network tip,
// and a mining attempt that loses a race against replication aborts with
// `ConflictingLocalState` and simply retries next slot.

mod leader;
mod validator_pick;

pub use leader::{current_slot, elect_leader, in_quick_sync_window, is_leader};
pub use validator_pick::{pick_validator, selection_seed};

use crate::config::{Settings, LEADER_CHECK_INTERVAL};
use crate::core::error::{SyncError, SyncResult};
use crate::core::storage::StoreGateway;
use crate::net::broadcast::Broadcaster;
use crate::net::registry::{rank_peers, PeerRegistry, PeerStatus, SelectionStrategy};
use crate::net::replicator::Replicator;
use log::{debug, info, warn};
use nodesync_common::{
    block::{calculate_merkle_root, Block},
    crypto::Hash,
    event::BlockEvent,
    mempool::MempoolEntry,
    time::get_current_time_in_seconds,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
pub enum MineOutcome {
    Mined {
        height: u64,
        hash: Hash,
        tx_count: usize,
    },
    NotLeader,
    QuickSyncWindow,
    IntervalNotElapsed,
    NoPending,
}

pub struct Miner {
    store: Arc<StoreGateway>,
    registry: Arc<PeerRegistry>,
    replicator: Arc<Replicator>,
    broadcaster: Broadcaster,
    settings: Arc<Settings>,
}

impl Miner {
    pub fn new(
        store: Arc<StoreGateway>,
        registry: Arc<PeerRegistry>,
        replicator: Arc<Replicator>,
        broadcaster: Broadcaster,
        settings: Arc<Settings>,
    ) -> Self {
        Miner {
            store,
            registry,
            replicator,
            broadcaster,
            settings,
        }
    }

    /// One mining attempt.
    ///
    /// `min_interval` is the required spacing since the last block;
    /// `coordinated` enables leader election, the pre-mine sync guard and
    /// the peer broadcast (off for single-node development mining).
    pub async fn mine_once(
        &self,
        min_interval: Option<u64>,
        max_tx: u64,
        coordinated: bool,
    ) -> SyncResult<MineOutcome> {
        let now = get_current_time_in_seconds();

        if in_quick_sync_window(now) {
            return Ok(MineOutcome::QuickSyncWindow);
        }

        let mut tip = self.store.tip_height().await?;
        if let (Some(interval), Some(height)) = (min_interval, tip) {
            if let Some(last) = self.store.block_by_height(height).await? {
                if now.saturating_sub(last.timestamp) < interval {
                    return Ok(MineOutcome::IntervalNotElapsed);
                }
            }
        }

        let mut peers: Vec<PeerStatus> = Vec::new();
        if coordinated {
            let candidates = self.registry.exclude_self(self.registry.candidates().await?);
            peers = self.registry.probe_all(candidates).await;

            // every node must derive the same ordering: node ids where a
            // record exists, base URLs otherwise
            let identities: Vec<String> = peers
                .iter()
                .map(|p| p.node_id.clone().unwrap_or_else(|| p.base_url.clone()))
                .collect();
            if !is_leader(&self.settings.node_id, &identities, now) {
                return Ok(MineOutcome::NotLeader);
            }

            // sync guard: never mine ahead of a peer that is ahead of us
            let local_tip = tip.unwrap_or(0);
            let someone_ahead = peers
                .iter()
                .any(|p| p.height.map(|h| h > local_tip).unwrap_or(false));
            if someone_ahead {
                info!("a peer is ahead of local tip {}, syncing before mining", local_tip);
                let mut ranked = peers.clone();
                rank_peers(&mut ranked, SelectionStrategy::default());
                if let Some(best) = ranked.first().filter(|p| p.accessible) {
                    self.replicator.sync_chain(&best.base_url).await?;
                    tip = self.store.tip_height().await?;
                }
            }
        }

        let (next_height, parent_hash) = match tip {
            Some(height) => {
                let parent = self
                    .store
                    .block_hash_at(height)
                    .await?
                    .ok_or(SyncError::Store(sqlx::Error::RowNotFound))?;
                (height + 1, parent)
            }
            None => (0, Hash::zero()),
        };

        let entries: Vec<MempoolEntry> = self
            .store
            .pending_mempool_entries(max_tx)
            .await?
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .collect();
        if entries.is_empty() {
            return Ok(MineOutcome::NoPending);
        }

        let mut candidates = self.store.eligible_validators().await?;
        if candidates.is_empty() {
            let address = self.store.system_validator_address().await?;
            candidates.push(self.store.ensure_system_validator(&address).await?);
        }
        let seed = selection_seed(&parent_hash, next_height);
        let Some(validator) = pick_validator(&candidates, seed) else {
            return Ok(MineOutcome::NoPending);
        };

        let tx_hashes: Vec<Hash> = entries.iter().map(|e| e.tx_hash.clone()).collect();
        let merkle_root = calculate_merkle_root(&tx_hashes);
        let hash = Block::compute_hash(next_height, now, &parent_hash, &merkle_root, &validator.address);
        let block = Block {
            height: next_height,
            signature: Block::compute_signature(&hash, &validator.address),
            hash: hash.clone(),
            parent_hash,
            merkle_root,
            timestamp: now,
            validator: validator.address.clone(),
            tx_count: entries.len() as u32,
            metadata: Value::Null,
        };

        // single local transaction; aborts with ConflictingLocalState if
        // the tip moved underneath us
        self.store.persist_mined_block(&block, &entries).await?;
        self.store
            .record_block_produced(&validator.address, next_height)
            .await?;
        self.store.remove_mempool_hashes(&tx_hashes).await?;

        info!(
            "mined block {} ({}) with {} transactions, validator {}",
            next_height,
            hash,
            entries.len(),
            validator.address
        );

        let targets: Vec<String> = peers
            .iter()
            .filter(|p| p.accessible)
            .map(|p| p.base_url.clone())
            .collect();
        if !targets.is_empty() {
            let event = BlockEvent::new(
                hash.clone(),
                next_height,
                self.settings.node_id.clone(),
                now,
            );
            self.broadcaster.announce(&targets, &event).await;
        }

        Ok(MineOutcome::Mined {
            height: next_height,
            hash,
            tx_count: entries.len(),
        })
    }

    /// Leader-check loop: one attempt every five seconds until shutdown.
    pub async fn run_loop(
        &self,
        interval_s: u64,
        max_tx: u64,
        coordinated: bool,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "mining loop started (interval {}s, max {} txs, coordinated: {})",
            interval_s, max_tx, coordinated
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("mining loop stopping");
                    break;
                }
                _ = tokio::time::sleep(LEADER_CHECK_INTERVAL) => {
                    match self.mine_once(Some(interval_s), max_tx, coordinated).await {
                        Ok(MineOutcome::Mined { height, tx_count, .. }) => {
                            debug!("slot produced block {} with {} txs", height, tx_count);
                        }
                        Ok(outcome) => debug!("mining tick: {:?}", outcome),
                        Err(SyncError::ConflictingLocalState { expected, found }) => {
                            info!(
                                "tip advanced during mining (expected {}, found {}), attempt aborted",
                                expected, found
                            );
                        }
                        Err(e) => warn!("mining attempt failed: {}", e),
                    }
                }
            }
        }
    }
}
