// Outbound block announcements.
//
// Every peer gets a signed POST; after a short settle the announced
// height is verified against each peer's tip. A success rate under 50%
// suggests the network no longer shares one view of the peer set.

use crate::config::PEER_PROBE_CONCURRENCY;
use crate::net::client::PeerClient;
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use nodesync_common::{config::BROADCAST_SETTLE_SECONDS, event::BlockEvent};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub verified: usize,
}

impl BroadcastReport {
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.verified as f64 / self.attempted as f64
        }
    }
}

pub struct Broadcaster {
    client: Arc<PeerClient>,
}

impl Broadcaster {
    pub fn new(client: Arc<PeerClient>) -> Self {
        Broadcaster { client }
    }

    pub async fn announce(&self, peers: &[String], event: &BlockEvent) -> BroadcastReport {
        let mut report = BroadcastReport {
            attempted: peers.len(),
            ..Default::default()
        };
        if peers.is_empty() {
            return report;
        }

        let delivery_futures: Vec<_> = peers
            .iter()
            .map(|base| -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
                Box::pin(self.deliver_one(base, event))
            })
            .collect();
        let deliveries: Vec<bool> = stream::iter(delivery_futures)
            .buffer_unordered(PEER_PROBE_CONCURRENCY)
            .collect()
            .await;
        report.delivered = deliveries.iter().filter(|ok| **ok).count();

        tokio::time::sleep(Duration::from_secs(BROADCAST_SETTLE_SECONDS)).await;

        let verify_futures: Vec<_> = peers
            .iter()
            .map(|base| -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
                Box::pin(self.verify_one(base, event.block_height))
            })
            .collect();
        let confirmations: Vec<bool> = stream::iter(verify_futures)
            .buffer_unordered(PEER_PROBE_CONCURRENCY)
            .collect()
            .await;
        report.verified = confirmations.iter().filter(|ok| **ok).count();

        info!(
            "broadcast of block {}: {}/{} delivered, {}/{} verified",
            event.block_height,
            report.delivered,
            report.attempted,
            report.verified,
            report.attempted
        );
        if report.success_rate() < 0.5 {
            warn!(
                "suspected split-brain: only {}/{} peers verified block {}",
                report.verified, report.attempted, event.block_height
            );
        }
        report
    }

    async fn deliver_one(&self, base: &str, event: &BlockEvent) -> bool {
        match self.client.announce_block(base, "sync_new_block", event).await {
            Ok(_) => true,
            Err(primary) => {
                debug!(
                    "sync_new_block failed on {} ({}), trying compatibility alias",
                    base, primary
                );
                match self.client.announce_block(base, "block", event).await {
                    Ok(_) => true,
                    Err(fallback) => {
                        warn!("broadcast to {} failed: {}", base, fallback);
                        false
                    }
                }
            }
        }
    }

    async fn verify_one(&self, base: &str, announced_height: u64) -> bool {
        match self.client.remote_tip_height(base).await {
            Ok(Some(tip)) => tip >= announced_height,
            Ok(None) => false,
            Err(e) => {
                debug!("broadcast verify failed on {}: {}", base, e);
                false
            }
        }
    }
}
