// Peer enumeration, self-exclusion, probing and ranking.
//
// Candidates come from the local `nodes` table, then the `network.nodes`
// config key, then installation.json. Probing fans out with bounded
// concurrency; the winner is the accessible peer with the longest chain.

use crate::config::{Settings, PEER_PROBE_CONCURRENCY};
use crate::core::error::{SyncError, SyncResult};
use crate::core::storage::StoreGateway;
use crate::net::client::PeerClient;
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

#[derive(Debug, Clone)]
pub struct PeerCandidate {
    pub base_url: String,
    pub node_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub base_url: String,
    pub node_id: Option<String>,
    pub accessible: bool,
    pub latency_ms: u64,
    pub height: Option<u64>,
    pub total_transactions: Option<u64>,
}

/// All strategies currently share one ordering; the names are kept for
/// config compatibility with older deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    #[default]
    LongestChain,
    FastestResponse,
    ConsensusMajority,
}

impl std::str::FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "longest_chain" => Ok(SelectionStrategy::LongestChain),
            "fastest_response" => Ok(SelectionStrategy::FastestResponse),
            "consensus_majority" => Ok(SelectionStrategy::ConsensusMajority),
            other => Err(format!("unknown selection strategy: {}", other)),
        }
    }
}

// Written by the installer; read for self identification and as a
// last-resort peer source.
#[derive(Debug, Default, Deserialize)]
struct InstallationInfo {
    #[serde(default)]
    node_url: Option<String>,
    #[serde(default)]
    network_nodes: Vec<String>,
}

pub struct PeerRegistry {
    store: Arc<StoreGateway>,
    client: Arc<PeerClient>,
    settings: Arc<Settings>,
}

impl PeerRegistry {
    pub fn new(store: Arc<StoreGateway>, client: Arc<PeerClient>, settings: Arc<Settings>) -> Self {
        PeerRegistry {
            store,
            client,
            settings,
        }
    }

    /// Enumerate peer base URLs, most-trusted source first.
    pub async fn candidates(&self) -> SyncResult<Vec<PeerCandidate>> {
        let mut out = Vec::new();

        for node in self.store.active_nodes().await? {
            // rows describing this node itself never count as peers
            if node.node_id == self.settings.node_id {
                continue;
            }
            match node.endpoint() {
                Some(base_url) => out.push(PeerCandidate {
                    base_url,
                    node_id: Some(node.node_id),
                }),
                None => debug!("node {} has no usable endpoint", node.node_id),
            }
        }

        if out.is_empty() {
            if let Some(raw) = self.store.get_config_value("network.nodes").await? {
                out.extend(parse_node_list(&raw).into_iter().map(|base_url| PeerCandidate {
                    base_url,
                    node_id: None,
                }));
            }
        }

        if out.is_empty() {
            let info = self.installation_info();
            out.extend(info.network_nodes.iter().flat_map(|raw| {
                parse_node_list(raw).into_iter().map(|base_url| PeerCandidate {
                    base_url,
                    node_id: None,
                })
            }));
        }

        Ok(out)
    }

    fn installation_info(&self) -> InstallationInfo {
        std::fs::read_to_string(&self.settings.installation_file)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Drop candidates that resolve to this node's own endpoint. If that
    /// empties the set, fall back to the unfiltered list.
    pub fn exclude_self(&self, candidates: Vec<PeerCandidate>) -> Vec<PeerCandidate> {
        let self_endpoint = match self
            .installation_info()
            .node_url
            .as_deref()
            .and_then(host_port)
        {
            Some(endpoint) => endpoint,
            None => return candidates,
        };

        let filtered: Vec<PeerCandidate> = candidates
            .iter()
            .filter(|candidate| {
                host_port(&candidate.base_url)
                    .map(|endpoint| endpoint != self_endpoint)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if filtered.is_empty() && !candidates.is_empty() {
            warn!("self-exclusion removed every candidate, keeping unfiltered list");
            return candidates;
        }
        filtered
    }

    pub async fn probe_all(&self, candidates: Vec<PeerCandidate>) -> Vec<PeerStatus> {
        stream::iter(candidates)
            .map(|candidate| {
                let client = Arc::clone(&self.client);
                async move { probe_one(&client, candidate).await }
            })
            .buffer_unordered(PEER_PROBE_CONCURRENCY)
            .collect()
            .await
    }

    /// Returns the best accessible peer and the remaining ranked statuses
    /// (used afterwards for quorum sampling).
    pub async fn select_best(
        &self,
        strategy: SelectionStrategy,
    ) -> SyncResult<(PeerStatus, Vec<PeerStatus>)> {
        let candidates = self.exclude_self(self.candidates().await?);
        if candidates.is_empty() {
            return Err(SyncError::NoPeers);
        }

        let mut statuses = self.probe_all(candidates).await;
        rank_peers(&mut statuses, strategy);

        if !statuses.first().map(|s| s.accessible).unwrap_or(false) {
            return Err(SyncError::NoPeers);
        }

        let best = statuses.remove(0);
        info!(
            "selected peer {} (height {:?}, {} ms)",
            best.base_url, best.height, best.latency_ms
        );
        Ok((best, statuses))
    }
}

async fn probe_one(client: &PeerClient, candidate: PeerCandidate) -> PeerStatus {
    let started = Instant::now();
    let mut status = PeerStatus {
        base_url: candidate.base_url,
        node_id: candidate.node_id,
        accessible: false,
        latency_ms: 0,
        height: None,
        total_transactions: None,
    };

    match client.get_tip_hashes(&status.base_url, 0, 1).await {
        Ok(rows) if !rows.is_empty() => {
            status.accessible = true;
            status.height = Some(rows[0].height);
            status.latency_ms = started.elapsed().as_millis() as u64;
            return status;
        }
        Ok(_) => debug!("{} returned an empty tip set", status.base_url),
        Err(e) => debug!("get_tip_hashes probe failed on {}: {}", status.base_url, e),
    }

    match client.get_network_stats(&status.base_url).await {
        Ok(stats) => {
            status.accessible = true;
            status.height = stats.height;
            status.total_transactions = stats.total_transactions;
            status.latency_ms = started.elapsed().as_millis() as u64;
            return status;
        }
        Err(e) => debug!(
            "get_network_stats probe failed on {}: {}",
            status.base_url, e
        ),
    }

    match client.get_network_config(&status.base_url).await {
        Ok(_) => {
            status.accessible = true;
            status.latency_ms = started.elapsed().as_millis() as u64;
        }
        Err(e) => debug!(
            "get_network_config probe failed on {}: {}",
            status.base_url, e
        ),
    }

    status
}

/// Primary key height desc, then claimed transactions desc, then latency
/// asc. Inaccessible peers sink to the bottom.
pub fn rank_peers(statuses: &mut [PeerStatus], _strategy: SelectionStrategy) {
    statuses.sort_by(|a, b| {
        b.accessible
            .cmp(&a.accessible)
            .then_with(|| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)))
            .then_with(|| {
                b.total_transactions
                    .unwrap_or(0)
                    .cmp(&a.total_transactions.unwrap_or(0))
            })
            .then_with(|| a.latency_ms.cmp(&b.latency_ms))
    });
}

/// `(lowercase host, effective port)` with 80/443 scheme defaults.
pub fn host_port(raw: &str) -> Option<(String, u16)> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
    Some((host, port))
}

/// Split a newline- or comma-separated node list, defaulting bare
/// host[:port] entries to http.
pub fn parse_node_list(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains("://") {
                s.trim_end_matches('/').to_string()
            } else {
                format!("http://{}", s.trim_end_matches('/'))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(base: &str, accessible: bool, height: Option<u64>, txs: Option<u64>, latency: u64) -> PeerStatus {
        PeerStatus {
            base_url: base.to_string(),
            node_id: None,
            accessible,
            latency_ms: latency,
            height,
            total_transactions: txs,
        }
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(
            "longest_chain".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::LongestChain
        );
        assert_eq!(
            " Fastest_Response ".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::FastestResponse
        );
        assert_eq!(
            "consensus_majority".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::ConsensusMajority
        );
        assert!("quorum".parse::<SelectionStrategy>().is_err());
    }

    #[test]
    fn host_port_defaults_by_scheme() {
        assert_eq!(
            host_port("http://Node.Example.org"),
            Some(("node.example.org".to_string(), 80))
        );
        assert_eq!(
            host_port("https://node.example.org"),
            Some(("node.example.org".to_string(), 443))
        );
        assert_eq!(
            host_port("http://10.0.0.5:8080"),
            Some(("10.0.0.5".to_string(), 8080))
        );
        assert_eq!(host_port("not a url"), None);
    }

    #[test]
    fn node_list_parsing() {
        let parsed = parse_node_list("http://a.example\n b.example:8080, https://c.example/ ,");
        assert_eq!(
            parsed,
            vec![
                "http://a.example".to_string(),
                "http://b.example:8080".to_string(),
                "https://c.example".to_string(),
            ]
        );
    }

    #[test]
    fn ranking_prefers_height_then_txs_then_latency() {
        let mut peers = vec![
            status("a", true, Some(10), Some(100), 50),
            status("b", true, Some(12), Some(10), 900),
            status("c", true, Some(12), Some(50), 100),
            status("d", true, Some(12), Some(50), 30),
            status("e", false, Some(99), None, 1),
        ];
        rank_peers(&mut peers, SelectionStrategy::LongestChain);
        let order: Vec<&str> = peers.iter().map(|p| p.base_url.as_str()).collect();
        assert_eq!(order, vec!["d", "c", "b", "a", "e"]);
    }
}
