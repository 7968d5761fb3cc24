// Transaction replication.
//
// Incremental mode streams pages from the source and inserts what is
// missing; exact mode wipes and reimports the full dump while preserving
// locally-invalidated marks.

use super::Replicator;
use crate::config::{sync_logging_enabled, SYNC_TX_NO_NEW_STREAK, TX_GAP_ADVISORY_LIMIT};
use crate::core::error::SyncResult;
use log::{debug, info, warn};
use nodesync_common::crypto::Address;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStopReason {
    /// Pagination said there is nothing more, or a short page arrived.
    Exhausted,
    /// Per-run insert cap reached.
    RunCap,
    /// Too many consecutive pages without pagination info or new rows.
    NoNewStreak,
    /// Small claimed gap but pages of known rows: the remainder is
    /// probably unreachable (foreign-key violations on the source side).
    EarlyStop,
}

#[derive(Debug, Clone)]
pub struct TxSyncReport {
    pub source: String,
    pub pages: u64,
    pub scanned: u64,
    pub inserted: u64,
    pub wallets_rebuilt: u64,
    pub stop: TxStopReason,
}

/// Tracks consecutive pages without a single insert; only armed when the
/// source's claimed advantage is small enough that scanning further is
/// pointless.
struct EarlyStop {
    armed: bool,
    threshold: u64,
    dry_pages: u64,
}

impl EarlyStop {
    fn new(threshold: u64, gap: Option<u64>) -> Self {
        EarlyStop {
            // threshold 0 disables the heuristic entirely
            armed: threshold > 0 && matches!(gap, Some(g) if g <= TX_GAP_ADVISORY_LIMIT),
            threshold,
            dry_pages: 0,
        }
    }

    fn record_page(&mut self, inserted_in_page: u64) -> bool {
        if !self.armed {
            return false;
        }
        if inserted_in_page > 0 {
            self.dry_pages = 0;
            return false;
        }
        self.dry_pages += 1;
        self.dry_pages >= self.threshold
    }
}

impl Replicator {
    /// Incremental import. `source_total_claim` is the tx count the source
    /// advertised during probing, if any; advisory only.
    pub async fn sync_transactions(
        &self,
        source: &str,
        source_total_claim: Option<u64>,
    ) -> SyncResult<TxSyncReport> {
        let page_limit = self.settings().tx_page_limit;
        let max_per_run = self.settings().max_tx_per_run;

        let local_total = self.store().transaction_count().await?;
        let claim = match source_total_claim {
            Some(claim) => Some(claim),
            None => self
                .client()
                .get_network_stats(source)
                .await
                .ok()
                .and_then(|stats| stats.total_transactions),
        };
        let gap = claim.map(|c| c.saturating_sub(local_total));

        let mut report = TxSyncReport {
            source: source.to_string(),
            pages: 0,
            scanned: 0,
            inserted: 0,
            wallets_rebuilt: 0,
            stop: TxStopReason::Exhausted,
        };
        let mut touched: BTreeSet<Address> = BTreeSet::new();
        let mut early_stop = EarlyStop::new(self.settings().tx_early_stop_pages, gap);
        let mut no_new_streak = 0u32;
        let mut use_legacy = false;
        let mut page = 1u64;

        'pages: loop {
            let result = if use_legacy {
                self.client()
                    .get_legacy_transactions(source, page, page_limit)
                    .await
            } else {
                self.client()
                    .get_all_transactions(source, page, page_limit)
                    .await
            };

            let (batch, pagination) = match result {
                Ok(parts) => parts,
                Err(e) if page == 1 && !use_legacy => {
                    debug!(
                        "get_all_transactions unavailable on {} ({}), probing legacy endpoint",
                        source, e
                    );
                    use_legacy = true;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if batch.is_empty() {
                break;
            }
            report.pages += 1;
            let batch_len = batch.len() as u64;

            let mut inserted_in_page = 0u64;
            for tx in &batch {
                report.scanned += 1;
                if self.store().insert_transaction_if_absent(tx).await? {
                    report.inserted += 1;
                    inserted_in_page += 1;
                    touched.insert(tx.from.clone());
                    touched.insert(tx.to.clone());
                }
                if max_per_run > 0 && report.inserted >= max_per_run {
                    report.stop = TxStopReason::RunCap;
                    break 'pages;
                }
            }

            if early_stop.record_page(inserted_in_page) {
                warn!(
                    "early stop on {}: claimed gap {:?} but {} pages without a new row; \
                     the remainder is likely locally unreferencable",
                    source, gap, early_stop.dry_pages
                );
                report.stop = TxStopReason::EarlyStop;
                break;
            }

            match &pagination {
                Some(p) => {
                    if !p.has_more {
                        break;
                    }
                }
                None => {
                    if inserted_in_page == 0 {
                        no_new_streak += 1;
                        if no_new_streak >= SYNC_TX_NO_NEW_STREAK {
                            report.stop = TxStopReason::NoNewStreak;
                            break;
                        }
                    } else {
                        no_new_streak = 0;
                    }
                }
            }

            // a short page means the source ran out
            if batch_len < page_limit {
                break;
            }
            page += 1;
        }

        if report.inserted > 0 {
            let addresses: Vec<Address> = touched.into_iter().collect();
            report.wallets_rebuilt = self
                .store()
                .rebuild_wallet_cache(Some(&addresses))
                .await?;
        }

        if sync_logging_enabled() || report.inserted > 0 {
            info!(
                "transaction sync from {}: +{} of {} scanned over {} pages ({:?})",
                source, report.inserted, report.scanned, report.pages, report.stop
            );
        }
        Ok(report)
    }

    /// Exact replication: wipe and reimport every transaction from the
    /// source, then restore local invalid marks and rebuild derived state.
    pub async fn exact_replication(&self, source: &str) -> SyncResult<TxSyncReport> {
        warn!("exact transaction replication from {} (destructive)", source);

        let invalid = self.store().invalid_transaction_hashes().await?;
        let wiped = self.store().truncate_transactions().await?;
        debug!(
            "wiped {} rows, preserving {} invalid marks",
            wiped,
            invalid.len()
        );

        let rows = self.client().export_transactions(source).await?;
        let scanned = rows.len() as u64;
        let mut inserted = 0u64;
        for tx in &rows {
            if self.store().insert_transaction_if_absent(tx).await? {
                inserted += 1;
            }
        }

        let remarked = self.store().mark_transactions_invalid(&invalid).await?;
        let wallets_rebuilt = self.store().rebuild_wallet_cache(None).await?;
        self.store().recalculate_block_tx_counts().await?;
        self.store().recalculate_wallet_nonces().await?;

        info!(
            "exact replication from {}: {} imported, {} invalid marks restored, \
             {} wallets rebuilt",
            source, inserted, remarked, wallets_rebuilt
        );

        Ok(TxSyncReport {
            source: source.to_string(),
            pages: 1,
            scanned,
            inserted,
            wallets_rebuilt,
            stop: TxStopReason::Exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_stop_requires_small_gap() {
        let mut wide_gap = EarlyStop::new(2, Some(TX_GAP_ADVISORY_LIMIT + 1));
        assert!(!wide_gap.record_page(0));
        assert!(!wide_gap.record_page(0));
        assert!(!wide_gap.record_page(0));

        let mut unknown_gap = EarlyStop::new(2, None);
        assert!(!unknown_gap.record_page(0));
        assert!(!unknown_gap.record_page(0));
    }

    #[test]
    fn early_stop_triggers_after_threshold_dry_pages() {
        let mut tracker = EarlyStop::new(3, Some(100));
        assert!(!tracker.record_page(0));
        assert!(!tracker.record_page(0));
        assert!(tracker.record_page(0));
    }

    #[test]
    fn early_stop_resets_on_progress() {
        let mut tracker = EarlyStop::new(2, Some(100));
        assert!(!tracker.record_page(0));
        assert!(!tracker.record_page(5));
        assert!(!tracker.record_page(0));
        assert!(tracker.record_page(0));
    }

    #[test]
    fn early_stop_disabled_by_zero_threshold() {
        let mut tracker = EarlyStop::new(0, Some(1));
        for _ in 0..100 {
            assert!(!tracker.record_page(0));
        }
    }
}
