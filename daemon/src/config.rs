use crate::core::error::SyncError;
use lazy_static::lazy_static;
use std::{env, path::PathBuf, time::Duration};

// bind address for the inbound broadcast/trigger intake
pub const DEFAULT_INTAKE_BIND_ADDRESS: &str = "0.0.0.0:8989";

// Per-call timeouts. Probes are short so an unreachable peer cannot stall
// the selector; heavy fetches get more room; triggers are fire-and-forget.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(6);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const TRIGGER_TIMEOUT: Duration = Duration::from_secs(5);

// Peer I/O inside a step fans out across at most this many workers
pub const PEER_PROBE_CONCURRENCY: usize = 8;

// Chain download bounds
pub const BLOCKS_RANGE_MAX: u64 = 500;
pub const ALL_BLOCKS_PAGE_LIMIT: u64 = 100;
// trailing window compared against the source before assuming a fork
pub const FORK_CHECK_WINDOW: u64 = 5;

// Transaction replication
// Without pagination info, stop after this many consecutive pages that
// inserted nothing new.
pub const SYNC_TX_NO_NEW_STREAK: u32 = 5;
// The early-stop heuristic only engages when the source's claimed
// transaction advantage is at most this. The claim is advisory: peer
// versions disagree on whether it includes the mempool.
pub const TX_GAP_ADVISORY_LIMIT: u64 = 2000;

const DEFAULT_TX_PAGE_LIMIT: u64 = 1000;
const DEFAULT_MAX_TX_PER_RUN: u64 = 10_000;
const DEFAULT_TX_EARLY_STOP_PAGES: u64 = 20;

// Scheduling
pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 60;
pub const LEADER_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MINE_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_MAX_BLOCK_TXS: u64 = 100;

lazy_static! {
    // SYNC_LOGGING / SYNC_LOGGING_ENABLED turn on verbose per-step logs
    static ref SYNC_LOGGING: bool = {
        let raw = env::var("SYNC_LOGGING")
            .or_else(|_| env::var("SYNC_LOGGING_ENABLED"))
            .unwrap_or_default();
        matches!(raw.as_str(), "1" | "true" | "TRUE" | "True")
    };
}

pub fn sync_logging_enabled() -> bool {
    *SYNC_LOGGING
}

/// Immutable runtime configuration, assembled once from the environment
/// and passed to every constructor.
#[derive(Clone)]
pub struct Settings {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub node_id: String,
    pub sync_api_token: Option<String>,
    pub broadcast_secret: Option<Vec<u8>>,
    pub tx_page_limit: u64,
    pub max_tx_per_run: u64,
    // 0 disables the early-stop heuristic
    pub tx_early_stop_pages: u64,
    pub installation_file: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, SyncError> {
        let db_name = required("DB_DATABASE")?;
        let db_user = required("DB_USERNAME")?;

        Ok(Settings {
            db_host: env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            db_port: env_u16("DB_PORT", 3306),
            db_name,
            db_user,
            db_password: env::var("DB_PASSWORD").unwrap_or_default(),
            node_id: env::var("NODE_ID").unwrap_or_else(|_| "local-node".to_string()),
            sync_api_token: non_empty(env::var("SYNC_API_TOKEN").ok()),
            broadcast_secret: non_empty(
                env::var("BROADCAST_SECRET")
                    .or_else(|_| env::var("NETWORK_BROADCAST_SECRET"))
                    .ok(),
            )
            .map(String::into_bytes),
            tx_page_limit: env_u64_clamped("SYNC_TX_PAGE_LIMIT", DEFAULT_TX_PAGE_LIMIT, 10, 1000),
            max_tx_per_run: env_u64_clamped(
                "SYNC_MAX_TRANSACTIONS_PER_RUN",
                DEFAULT_MAX_TX_PER_RUN,
                0,
                200_000,
            ),
            tx_early_stop_pages: env_u64_clamped(
                "SYNC_TX_EARLY_STOP_PAGES",
                DEFAULT_TX_EARLY_STOP_PAGES,
                0,
                10_000,
            ),
            installation_file: PathBuf::from("installation.json"),
        })
    }
}

fn required(name: &str) -> Result<String, SyncError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SyncError::Config(format!("{} is not set", name))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64_clamped(name: &str, default: u64, min: u64, max: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_applies_bounds() {
        env::set_var("NODESYNC_TEST_CLAMP", "5000");
        assert_eq!(env_u64_clamped("NODESYNC_TEST_CLAMP", 1000, 10, 1000), 1000);
        env::set_var("NODESYNC_TEST_CLAMP", "3");
        assert_eq!(env_u64_clamped("NODESYNC_TEST_CLAMP", 1000, 10, 1000), 10);
        env::remove_var("NODESYNC_TEST_CLAMP");
        assert_eq!(env_u64_clamped("NODESYNC_TEST_CLAMP", 1000, 10, 1000), 1000);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        env::set_var("NODESYNC_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_u64_clamped("NODESYNC_TEST_GARBAGE", 42, 0, 100), 42);
        env::remove_var("NODESYNC_TEST_GARBAGE");
    }
}
