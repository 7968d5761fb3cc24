// Auxiliary replication: wallets, validators, smart contracts, staking,
// peer list and mempool pull. Each is a paginated fetch-and-upsert; the
// staking path honors the terminal-state freeze inside the gateway.

use super::Replicator;
use crate::config::sync_logging_enabled;
use crate::core::error::SyncResult;
use log::{debug, info};
use nodesync_common::{
    mempool::{priority_score, MempoolEntry},
    time::get_current_time_in_seconds,
    transaction::TxStatus,
};

const AUX_PAGE_LIMIT: u64 = 500;

#[derive(Debug, Default, Clone)]
pub struct AuxReport {
    pub wallets: u64,
    pub validators: u64,
    pub contracts: u64,
    pub staking: u64,
    pub nodes: u64,
    pub mempool_pulled: u64,
}

impl Replicator {
    pub async fn sync_auxiliary(&self, source: &str) -> SyncResult<AuxReport> {
        let report = AuxReport {
            wallets: self.sync_wallets(source).await?,
            validators: self.sync_validators(source).await?,
            contracts: self.sync_contracts(source).await?,
            staking: self.sync_staking(source).await?,
            nodes: self.sync_nodes(source).await?,
            mempool_pulled: self.sync_mempool(source).await?,
        };

        if sync_logging_enabled() {
            info!(
                "aux sync from {}: {} wallets, {} validators, {} contracts, \
                 {} staking, {} nodes, {} mempool",
                source,
                report.wallets,
                report.validators,
                report.contracts,
                report.staking,
                report.nodes,
                report.mempool_pulled
            );
        }
        Ok(report)
    }

    async fn sync_wallets(&self, source: &str) -> SyncResult<u64> {
        let mut upserted = 0u64;
        let mut page = 1u64;
        loop {
            let (batch, pagination) = self
                .client()
                .get_wallets(source, page, AUX_PAGE_LIMIT)
                .await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;
            for wallet in &batch {
                self.store().upsert_wallet(wallet).await?;
                upserted += 1;
            }
            if !pagination.map(|p| p.has_more).unwrap_or(false) || batch_len < AUX_PAGE_LIMIT {
                break;
            }
            page += 1;
        }
        Ok(upserted)
    }

    async fn sync_validators(&self, source: &str) -> SyncResult<u64> {
        let mut upserted = 0u64;
        for validator in self.client().get_validators_list(source).await? {
            self.store().upsert_validator(&validator).await?;
            upserted += 1;
        }
        Ok(upserted)
    }

    async fn sync_contracts(&self, source: &str) -> SyncResult<u64> {
        let mut upserted = 0u64;
        let mut page = 1u64;
        loop {
            let (batch, pagination) = self
                .client()
                .get_smart_contracts(source, page, AUX_PAGE_LIMIT)
                .await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;
            for contract in &batch {
                self.store().upsert_contract(contract).await?;
                upserted += 1;
            }
            if !pagination.map(|p| p.has_more).unwrap_or(false) || batch_len < AUX_PAGE_LIMIT {
                break;
            }
            page += 1;
        }
        Ok(upserted)
    }

    async fn sync_staking(&self, source: &str) -> SyncResult<u64> {
        let mut upserted = 0u64;
        let mut page = 1u64;
        loop {
            let (batch, pagination) = self
                .client()
                .get_staking_records(source, page, AUX_PAGE_LIMIT)
                .await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;
            for record in &batch {
                // terminal rows are silently frozen by the gateway
                self.store().upsert_staking(record).await?;
                upserted += 1;
            }
            if !pagination.map(|p| p.has_more).unwrap_or(false) || batch_len < AUX_PAGE_LIMIT {
                break;
            }
            page += 1;
        }
        Ok(upserted)
    }

    /// Refresh the peer registry. Reputation is locally owned and never
    /// overwritten by replicated rows.
    async fn sync_nodes(&self, source: &str) -> SyncResult<u64> {
        let mut upserted = 0u64;
        for node in self.client().get_nodes_list(source).await? {
            if node.node_id == self.settings().node_id {
                continue;
            }
            self.store().upsert_node(&node).await?;
            upserted += 1;
        }
        Ok(upserted)
    }

    /// Pull pending transactions the source holds that we have neither in
    /// our mempool nor already confirmed.
    pub async fn sync_mempool(&self, source: &str) -> SyncResult<u64> {
        let now = get_current_time_in_seconds();
        let mut pulled = 0u64;
        let mut page = 1u64;

        loop {
            let (batch, pagination) = self
                .client()
                .get_mempool(source, page, AUX_PAGE_LIMIT)
                .await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;

            for remote in &batch {
                if self.store().mempool_contains(&remote.tx_hash).await? {
                    continue;
                }
                if self
                    .store()
                    .confirmed_transaction_exists(&remote.tx_hash)
                    .await?
                {
                    debug!(
                        "mempool pull: {} already confirmed locally",
                        remote.tx_hash
                    );
                    continue;
                }

                let entry = MempoolEntry {
                    status: TxStatus::Pending,
                    priority_score: priority_score(remote.fee, remote.amount),
                    created_at: if remote.created_at > 0 {
                        remote.created_at
                    } else {
                        now
                    },
                    ..remote.clone()
                };
                if self.store().insert_mempool_if_absent(&entry).await? {
                    pulled += 1;
                }
            }

            if !pagination.map(|p| p.has_more).unwrap_or(false) || batch_len < AUX_PAGE_LIMIT {
                break;
            }
            page += 1;
        }

        if pulled > 0 {
            info!("pulled {} mempool entries from {}", pulled, source);
        }
        Ok(pulled)
    }
}
