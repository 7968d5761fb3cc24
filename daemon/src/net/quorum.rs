// Quorum verification and the reputation ledger.
//
// After replicating from a source, a small sample of other peers is asked
// for their block hashes near the shared tip. Disagreement below the
// threshold penalizes the source; agreement (or an unverifiable network)
// rewards it.

use crate::config::PEER_PROBE_CONCURRENCY;
use crate::core::error::SyncResult;
use crate::core::storage::StoreGateway;
use crate::net::client::PeerClient;
use crate::net::registry::PeerStatus;
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use nodesync_common::{
    config::{QUORUM_PEER_SAMPLE, QUORUM_WINDOW_DEPTH, REPUTATION_PENALTY, REPUTATION_REWARD},
    crypto::constant_time_compare,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct QuorumOutcome {
    pub asked: usize,
    pub agreed: usize,
    pub passed: bool,
}

impl QuorumOutcome {
    pub fn ratio(&self) -> f64 {
        if self.asked == 0 {
            1.0
        } else {
            self.agreed as f64 / self.asked as f64
        }
    }
}

/// Majority for a real sample, unanimity for one or two voices.
fn agreement_threshold(asked: usize) -> f64 {
    if asked >= 3 {
        0.51
    } else {
        1.0
    }
}

pub struct QuorumVerifier {
    store: Arc<StoreGateway>,
    client: Arc<PeerClient>,
}

impl QuorumVerifier {
    pub fn new(store: Arc<StoreGateway>, client: Arc<PeerClient>) -> Self {
        QuorumVerifier { store, client }
    }

    /// Cross-check `source` against up to `QUORUM_PEER_SAMPLE` peers.
    ///
    /// Sampling rules by network size (peers plus self): in a two-node
    /// network nobody can be excluded; from three nodes up the source is
    /// excluded; from four up the sample is entirely third-party.
    pub async fn verify_source(
        &self,
        source: &PeerStatus,
        others: &[PeerStatus],
    ) -> SyncResult<QuorumOutcome> {
        let network_size = others.len() + 2; // others + source + self

        let mut candidates: Vec<&PeerStatus> =
            others.iter().filter(|peer| peer.accessible).collect();
        if network_size <= 2 {
            candidates.push(source);
        }
        candidates.truncate(QUORUM_PEER_SAMPLE);

        if candidates.is_empty() {
            debug!("quorum skipped: no peers to sample");
            return Ok(QuorumOutcome {
                asked: 0,
                agreed: 0,
                passed: true,
            });
        }

        let local_tip = self.store().tip_height().await?.unwrap_or(0);
        let source_tip = source.height.unwrap_or(local_tip);
        let tip = local_tip.min(source_tip);

        let agree_futures: Vec<_> = candidates
            .into_iter()
            .map(|peer| -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
                Box::pin(self.peer_agrees(peer, tip))
            })
            .collect();
        let verdicts: Vec<bool> = stream::iter(agree_futures)
            .buffer_unordered(PEER_PROBE_CONCURRENCY)
            .collect()
            .await;

        let asked = verdicts.len();
        let agreed = verdicts.iter().filter(|v| **v).count();
        let outcome = QuorumOutcome {
            asked,
            agreed,
            passed: true,
        };
        let passed = outcome.ratio() >= agreement_threshold(asked);

        info!(
            "quorum on {}: {}/{} agreed (threshold {})",
            source.base_url,
            agreed,
            asked,
            agreement_threshold(asked)
        );
        Ok(QuorumOutcome { passed, ..outcome })
    }

    /// A peer agrees when any height inside the shared window carries the
    /// same hash as our local chain.
    async fn peer_agrees(&self, peer: &PeerStatus, tip: u64) -> bool {
        let peer_tip = match self.client.remote_tip_height(&peer.base_url).await {
            Ok(Some(height)) => height,
            Ok(None) => {
                debug!("{} reported no tip during quorum", peer.base_url);
                return false;
            }
            Err(e) => {
                debug!("quorum fetch failed on {}: {}", peer.base_url, e);
                return false;
            }
        };

        let h1 = tip.min(peer_tip);
        let h0 = h1.saturating_sub(QUORUM_WINDOW_DEPTH - 1);

        let local = match self.store.block_hashes_between(h0, h1).await {
            Ok(map) => map,
            Err(e) => {
                warn!("quorum local hash read failed: {}", e);
                return false;
            }
        };

        let remote = match self.client.get_block_hashes_range(&peer.base_url, h0, h1).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("quorum hash range failed on {}: {}", peer.base_url, e);
                return false;
            }
        };

        remote.iter().any(|row| {
            local
                .get(&row.height)
                .map(|hash| constant_time_compare(hash.as_bytes(), row.hash.as_bytes()))
                .unwrap_or(false)
        })
    }

    /// Apply the reputation delta for a finished round: reward on success,
    /// penalize on quorum disagreement. Only peers backed by a `nodes` row
    /// carry a score.
    pub async fn apply_reputation(
        &self,
        source: &PeerStatus,
        outcome: &QuorumOutcome,
    ) -> SyncResult<()> {
        let Some(node_id) = &source.node_id else {
            debug!("{} has no node record, reputation unchanged", source.base_url);
            return Ok(());
        };

        let delta = if outcome.passed {
            REPUTATION_REWARD
        } else {
            -REPUTATION_PENALTY
        };
        if let Some(score) = self.store.adjust_reputation(node_id, delta).await? {
            if !outcome.passed {
                warn!(
                    "penalized {} for quorum disagreement, reputation now {}",
                    node_id, score
                );
            }
        }
        Ok(())
    }

    fn store(&self) -> &StoreGateway {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_by_sample_size() {
        assert_eq!(agreement_threshold(0), 1.0);
        assert_eq!(agreement_threshold(1), 1.0);
        assert_eq!(agreement_threshold(2), 1.0);
        assert_eq!(agreement_threshold(3), 0.51);
        assert_eq!(agreement_threshold(5), 0.51);
    }

    #[test]
    fn ratio_of_empty_sample_is_unanimous() {
        let outcome = QuorumOutcome {
            asked: 0,
            agreed: 0,
            passed: true,
        };
        assert_eq!(outcome.ratio(), 1.0);
    }

    #[test]
    fn two_of_three_passes_majority() {
        let outcome = QuorumOutcome {
            asked: 3,
            agreed: 2,
            passed: false,
        };
        assert!(outcome.ratio() >= agreement_threshold(outcome.asked));
    }

    #[test]
    fn one_of_two_fails_unanimity() {
        let outcome = QuorumOutcome {
            asked: 2,
            agreed: 1,
            passed: false,
        };
        assert!(outcome.ratio() < agreement_threshold(outcome.asked));
    }
}
