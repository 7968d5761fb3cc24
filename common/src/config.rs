// Network-wide protocol constants shared by the daemon and its tests.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Leader election
// One peer is designated miner per slot; all nodes derive the same leader
// from the sorted peer set, assuming they see the same set for the slot.
pub const LEADER_SLOT_SECONDS: u64 = 300;

// Quick-sync window: seconds of each minute during which mining abstains,
// coordinated with the external 60-second sync cron.
pub const QUICK_SYNC_WINDOW_HEAD: u64 = 5;
pub const QUICK_SYNC_WINDOW_TAIL: u64 = 55;

// Quorum verification
pub const QUORUM_WINDOW_DEPTH: u64 = 20;
pub const QUORUM_PEER_SAMPLE: usize = 3;

// Reputation ledger
// Scores are clamped to [REPUTATION_MIN, REPUTATION_MAX]; rewarded on a
// successful outgoing sync, penalized on quorum disagreement.
pub const REPUTATION_MIN: i64 = 0;
pub const REPUTATION_MAX: i64 = 100;
pub const REPUTATION_REWARD: i64 = 1;
pub const REPUTATION_PENALTY: i64 = 10;

// Mempool janitoring
pub const MEMPOOL_TTL_HOURS: u64 = 24;
pub const MEMPOOL_STUCK_PROCESSING_SECONDS: u64 = 3600;
pub const MEMPOOL_FAILED_RETENTION_DAYS: u64 = 7;

// Minimum wallet balance for a validator to be eligible for block production
pub const MIN_VALIDATOR_BALANCE: u64 = 1000;

// Broadcast dedup: identical event ids are processed at most once within
// this sliding window.
pub const EVENT_DEDUP_TTL_SECONDS: u64 = 900;

// Settle delay between broadcasting a block and verifying peer tips
pub const BROADCAST_SETTLE_SECONDS: u64 = 3;
