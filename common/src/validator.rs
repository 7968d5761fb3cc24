use crate::api::compat;
use crate::crypto::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    #[serde(default)]
    pub public_key: String,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub stake: Decimal,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub delegated_stake: Decimal,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub commission_rate: Decimal,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub blocks_produced: u64,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub blocks_missed: u64,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub last_active_block: Option<u64>,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub jail_until_block: Option<u64>,
    #[serde(default)]
    pub metadata: Value,
}

fn default_status() -> String {
    "active".to_string()
}

impl Validator {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}
