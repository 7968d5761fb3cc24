// Round orchestration: select peer -> chain -> transactions -> auxiliary
// -> quorum -> janitor. Per-peer failures never fail a round; only an
// empty accessible set does.

use crate::config::Settings;
use crate::core::error::{SyncError, SyncResult};
use crate::core::janitor;
use crate::core::storage::{JanitorReport, MempoolStats, StoreGateway};
use crate::net::quorum::{QuorumOutcome, QuorumVerifier};
use crate::net::registry::{rank_peers, PeerRegistry, PeerStatus, SelectionStrategy};
use crate::net::replicator::{AuxReport, ChainSyncReport, Replicator, TxSyncReport};
use log::{error, info, warn};
use nodesync_common::time::get_current_time_in_seconds;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct RoundReport {
    pub peer: String,
    pub chain: ChainSyncReport,
    pub transactions: TxSyncReport,
    pub aux: AuxReport,
    pub quorum: QuorumOutcome,
    pub janitor: JanitorReport,
}

pub struct StatusReport {
    pub node_id: String,
    pub tip_height: Option<u64>,
    pub total_transactions: u64,
    pub mempool: MempoolStats,
    pub peers: Vec<PeerStatus>,
}

pub struct SyncService {
    store: Arc<StoreGateway>,
    registry: Arc<PeerRegistry>,
    replicator: Arc<Replicator>,
    quorum: QuorumVerifier,
    settings: Arc<Settings>,
}

impl SyncService {
    pub fn new(
        store: Arc<StoreGateway>,
        registry: Arc<PeerRegistry>,
        replicator: Arc<Replicator>,
        quorum: QuorumVerifier,
        settings: Arc<Settings>,
    ) -> Self {
        SyncService {
            store,
            registry,
            replicator,
            quorum,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<StoreGateway> {
        &self.store
    }

    pub fn replicator(&self) -> &Arc<Replicator> {
        &self.replicator
    }

    /// Strategy configured in the store (`network.sync_strategy`), falling
    /// back to longest-chain.
    async fn selection_strategy(&self) -> SelectionStrategy {
        match self.store.get_config_value("network.sync_strategy").await {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}, using longest_chain", e);
                SelectionStrategy::default()
            }),
            Ok(None) => SelectionStrategy::default(),
            Err(e) => {
                warn!("strategy lookup failed ({}), using longest_chain", e);
                SelectionStrategy::default()
            }
        }
    }

    pub async fn run_round(&self) -> SyncResult<RoundReport> {
        let strategy = self.selection_strategy().await;
        let (best, others) = self.registry.select_best(strategy).await?;

        let chain = self.replicator.sync_chain(&best.base_url).await?;
        let transactions = self
            .replicator
            .sync_transactions(&best.base_url, best.total_transactions)
            .await?;
        let aux = self.replicator.sync_auxiliary(&best.base_url).await?;

        let quorum = self.quorum.verify_source(&best, &others).await?;
        self.quorum.apply_reputation(&best, &quorum).await?;
        if let Some(node_id) = &best.node_id {
            self.store
                .touch_node_last_seen(node_id, get_current_time_in_seconds())
                .await?;
        }

        let janitor = janitor::run_maintenance(&self.store).await?;

        info!(
            "round complete via {}: +{} blocks, +{} transactions, quorum {}/{}",
            best.base_url, chain.blocks_inserted, transactions.inserted, quorum.agreed, quorum.asked
        );

        Ok(RoundReport {
            peer: best.base_url,
            chain,
            transactions,
            aux,
            quorum,
            janitor,
        })
    }

    /// Drive rounds every `interval_s` seconds (with a little jitter so a
    /// fleet does not thundering-herd its peers) until shutdown flips.
    pub async fn run_loop(&self, interval_s: u64, mut shutdown: watch::Receiver<bool>) {
        info!("sync loop started (interval {}s)", interval_s);
        loop {
            let jitter = rand::thread_rng().gen_range(0..5);
            let delay = Duration::from_secs(interval_s + jitter);
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sync loop stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    match self.run_round().await {
                        Ok(_) => {}
                        Err(SyncError::NoPeers) => warn!("no accessible peers this round"),
                        Err(e) => error!("sync round failed: {}", e),
                    }
                }
            }
        }
    }

    pub async fn status(&self) -> SyncResult<StatusReport> {
        let candidates = self.registry.exclude_self(self.registry.candidates().await?);
        let mut peers = self.registry.probe_all(candidates).await;
        rank_peers(&mut peers, SelectionStrategy::default());

        Ok(StatusReport {
            node_id: self.settings.node_id.clone(),
            tip_height: self.store.tip_height().await?,
            total_transactions: self.store.transaction_count().await?,
            mempool: self.store.mempool_stats().await?,
            peers,
        })
    }
}
