use crate::api::compat;
use crate::crypto::{Address, Hash};
use crate::transaction::{Transaction, TxStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A transaction waiting for inclusion in a block.
///
/// No `(from, nonce)` pair may appear twice in pending state; the janitor
/// collapses duplicates keeping the newest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEntry {
    #[serde(alias = "hash")]
    pub tx_hash: Hash,
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
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub gas_price: Decimal,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub status: TxStatus,
    #[serde(default, deserialize_with = "compat::f64_lenient")]
    pub priority_score: f64,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub created_at: u64,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub last_retry_at: Option<u64>,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub expires_at: Option<u64>,
}

impl MempoolEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }

    /// Build the confirmed transaction persisted when this entry is mined.
    pub fn to_confirmed_transaction(
        &self,
        block_hash: Hash,
        block_height: u64,
        timestamp: u64,
    ) -> Transaction {
        Transaction {
            hash: self.tx_hash.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            gas_used: 0,
            gas_price: self.gas_price,
            data: self.data.clone(),
            signature: self.signature.clone(),
            status: TxStatus::Confirmed,
            block_hash: Some(block_hash),
            block_height: Some(block_height),
            timestamp,
        }
    }
}

/// `fee * 10 + min(100, log10(amount + 1) * 20)`
pub fn priority_score(fee: Decimal, amount: Decimal) -> f64 {
    let fee = fee.to_f64().unwrap_or(0.0).max(0.0);
    let amount = amount.to_f64().unwrap_or(0.0).max(0.0);
    fee * 10.0 + ((amount + 1.0).log10() * 20.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_scores_by_fee_only() {
        let score = priority_score(Decimal::from(2), Decimal::ZERO);
        assert!((score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn amount_component_is_capped() {
        // log10(1e9 + 1) * 20 > 100, so the amount term saturates
        let score = priority_score(Decimal::ZERO, Decimal::from(1_000_000_000u64));
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn higher_fee_wins() {
        let amount = Decimal::from(50);
        assert!(priority_score(Decimal::from(3), amount) > priority_score(Decimal::from(1), amount));
    }

    #[test]
    fn expiry_check() {
        let raw = format!(
            r#"{{"tx_hash":"{}","from_address":"0x{}","to_address":"0x{}","expires_at":100,"created_at":10}}"#,
            "e".repeat(64),
            "1".repeat(40),
            "2".repeat(40)
        );
        let entry: MempoolEntry = serde_json::from_str(&raw).unwrap();
        assert!(entry.is_expired(101));
        assert!(!entry.is_expired(100));
    }
}
