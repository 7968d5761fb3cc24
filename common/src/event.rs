use crate::api::compat;
use crate::crypto::{sha256_hex, Hash};
use serde::{Deserialize, Serialize};

/// A block announcement exchanged between peers.
///
/// `event_id` is content-addressed so that replayed or multi-path
/// deliveries of the same announcement deduplicate cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub block_hash: Hash,
    #[serde(deserialize_with = "compat::u64_lenient")]
    pub block_height: u64,
    #[serde(default)]
    pub source_node: String,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub timestamp: u64,
    #[serde(default)]
    pub event_id: String,
}

impl BlockEvent {
    pub fn new(block_hash: Hash, block_height: u64, source_node: String, timestamp: u64) -> Self {
        let event_id = Self::compute_event_id(&block_hash, block_height, timestamp);
        BlockEvent {
            block_hash,
            block_height,
            source_node,
            timestamp,
            event_id,
        }
    }

    /// `sha256("{hash}|{height}|{timestamp}")`, hex-encoded.
    pub fn compute_event_id(block_hash: &Hash, block_height: u64, timestamp: u64) -> String {
        sha256_hex(format!("{}|{}|{}", block_hash, block_height, timestamp).as_bytes())
    }

    /// Fill in a missing id; senders that predate content addressing omit it.
    pub fn ensure_event_id(&mut self) {
        if self.event_id.is_empty() {
            self.event_id =
                Self::compute_event_id(&self.block_hash, self.block_height, self.timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    #[test]
    fn event_id_is_stable() {
        let hash = sha256(b"block");
        let a = BlockEvent::new(hash.clone(), 10, "node-a".to_string(), 1_700_000_000);
        let b = BlockEvent::new(hash, 10, "node-b".to_string(), 1_700_000_000);
        // source does not participate in the id
        assert_eq!(a.event_id, b.event_id);
    }

    #[test]
    fn event_id_depends_on_height_and_timestamp() {
        let hash = sha256(b"block");
        let a = BlockEvent::new(hash.clone(), 10, String::new(), 1_700_000_000);
        let b = BlockEvent::new(hash.clone(), 11, String::new(), 1_700_000_000);
        let c = BlockEvent::new(hash, 10, String::new(), 1_700_000_001);
        assert_ne!(a.event_id, b.event_id);
        assert_ne!(a.event_id, c.event_id);
    }

    #[test]
    fn ensure_fills_missing_id() {
        let hash = sha256(b"block");
        let mut event = BlockEvent {
            block_hash: hash.clone(),
            block_height: 5,
            source_node: String::new(),
            timestamp: 42,
            event_id: String::new(),
        };
        event.ensure_event_id();
        assert_eq!(event.event_id, BlockEvent::compute_event_id(&hash, 5, 42));
    }
}
