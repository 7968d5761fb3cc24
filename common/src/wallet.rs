use crate::api::compat;
use crate::crypto::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cached wallet state, derived from confirmed transactions and active
/// staking. Rebuilt rather than trusted: `balance` and `staked_balance`
/// can always be recomputed from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub balance: Decimal,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub staked_balance: Decimal,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub nonce: u64,
    #[serde(default)]
    pub public_key: String,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub updated_at: u64,
}
