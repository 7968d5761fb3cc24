mod merkle;

pub use merkle::calculate_merkle_root;

use crate::api::compat;
use crate::crypto::{sha256, sha256_hex, Address, Hash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A ledger block as stored locally and served by peer explorers.
///
/// Heights are dense from 0; for any height h > 0 the block links to its
/// predecessor through `parent_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(deserialize_with = "compat::u64_lenient", alias = "block_height")]
    pub height: u64,
    #[serde(alias = "block_hash")]
    pub hash: Hash,
    #[serde(alias = "previous_hash")]
    pub parent_hash: Hash,
    pub merkle_root: Hash,
    #[serde(deserialize_with = "compat::u64_lenient")]
    pub timestamp: u64,
    #[serde(alias = "validator_address")]
    pub validator: Address,
    #[serde(default)]
    pub signature: String,
    #[serde(default, deserialize_with = "compat::u32_lenient")]
    pub tx_count: u32,
    #[serde(default)]
    pub metadata: Value,
}

impl Block {
    /// `sha256(height || timestamp || parent_hash || merkle_root || validator)`
    /// over the decimal/hex string forms used on the wire.
    pub fn compute_hash(
        height: u64,
        timestamp: u64,
        parent_hash: &Hash,
        merkle_root: &Hash,
        validator: &Address,
    ) -> Hash {
        let preimage = format!(
            "{}{}{}{}{}",
            height, timestamp, parent_hash, merkle_root, validator
        );
        sha256(preimage.as_bytes())
    }

    /// `sha256(hash || validator)`, hex-encoded.
    pub fn compute_signature(hash: &Hash, validator: &Address) -> String {
        sha256_hex(format!("{}{}", hash, validator).as_bytes())
    }

    pub fn expected_hash(&self) -> Hash {
        Self::compute_hash(
            self.height,
            self.timestamp,
            &self.parent_hash,
            &self.merkle_root,
            &self.validator,
        )
    }

    pub fn links_to(&self, parent: &Block) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_validator() -> Address {
        Address::parse("0xabcdef0123456789abcdef0123456789abcdef01").unwrap()
    }

    fn test_block(height: u64, parent_hash: Hash) -> Block {
        let validator = test_validator();
        let merkle_root = Hash::zero();
        let timestamp = 1_700_000_000 + height;
        let hash = Block::compute_hash(height, timestamp, &parent_hash, &merkle_root, &validator);
        Block {
            height,
            signature: Block::compute_signature(&hash, &validator),
            hash,
            parent_hash,
            merkle_root,
            timestamp,
            validator,
            tx_count: 0,
            metadata: Value::Null,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let a = test_block(3, Hash::zero());
        let b = test_block(3, Hash::zero());
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash, a.expected_hash());
    }

    #[test]
    fn linkage() {
        let genesis = test_block(0, Hash::zero());
        let next = test_block(1, genesis.hash.clone());
        assert!(next.links_to(&genesis));
        let orphan = test_block(1, Hash::zero());
        assert!(!orphan.links_to(&genesis));
    }

    #[test]
    fn deserializes_php_style_numbers() {
        let raw = format!(
            r#"{{"height":"5","hash":"{}","parent_hash":"{}","merkle_root":"{}","timestamp":"1700000000","validator":"0xabcdef0123456789abcdef0123456789abcdef01","tx_count":"2"}}"#,
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(64)
        );
        let block: Block = serde_json::from_str(&raw).unwrap();
        assert_eq!(block.height, 5);
        assert_eq!(block.tx_count, 2);
        assert_eq!(block.hash, Hash::from_str(&"a".repeat(64)).unwrap());
    }
}
