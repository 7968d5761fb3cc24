use crate::api::compat;
use crate::crypto::{Address, Hash};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Confirmed,
    Invalid,
    Failed,
    Processing,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Invalid => "invalid",
            TxStatus::Failed => "failed",
            TxStatus::Processing => "processing",
        }
    }

    /// Parse a stored status string, mapping anything unknown to `Pending`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "confirmed" => TxStatus::Confirmed,
            "invalid" => TxStatus::Invalid,
            "failed" => TxStatus::Failed,
            "processing" => TxStatus::Processing,
            _ => TxStatus::Pending,
        }
    }
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger transaction, confirmed or otherwise.
///
/// `status = invalid` is only ever set locally; replication must not
/// overwrite it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(alias = "tx_hash")]
    pub hash: Hash,
    #[serde(rename = "from_address", alias = "from")]
    pub from: Address,
    #[serde(rename = "to_address", alias = "to")]
    pub to: Address,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub fee: Decimal,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub nonce: u64,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub gas_limit: u64,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub gas_price: Decimal,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub status: TxStatus,
    #[serde(default, deserialize_with = "compat::opt_hash_lenient")]
    pub block_hash: Option<Hash>,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub block_height: Option<u64>,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub timestamp: u64,
}

impl Transaction {
    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    /// Total debit applied to the sender when the transaction confirms.
    pub fn total_cost(&self) -> Decimal {
        self.amount + self.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_roundtrip() {
        for status in [
            TxStatus::Pending,
            TxStatus::Confirmed,
            TxStatus::Invalid,
            TxStatus::Failed,
            TxStatus::Processing,
        ] {
            assert_eq!(TxStatus::parse_lossy(status.as_str()), status);
        }
        assert_eq!(TxStatus::parse_lossy("garbage"), TxStatus::Pending);
    }

    #[test]
    fn deserializes_legacy_field_names() {
        let raw = format!(
            r#"{{"hash":"{}","from":"0x{}","to":"0x{}","amount":"2.5","fee":"0.01","nonce":"3","status":"confirmed","block_hash":"","timestamp":1700000000}}"#,
            "d".repeat(64),
            "1".repeat(40),
            "2".repeat(40)
        );
        let tx: Transaction = serde_json::from_str(&raw).unwrap();
        assert_eq!(tx.amount, Decimal::from_str("2.5").unwrap());
        assert_eq!(tx.nonce, 3);
        assert!(tx.is_confirmed());
        assert!(tx.block_hash.is_none());
        assert_eq!(tx.total_cost(), Decimal::from_str("2.51").unwrap());
    }
}
