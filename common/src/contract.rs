use crate::api::compat;
use crate::crypto::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smart contract row, replicated as an opaque passthrough: the daemon
/// never executes contracts, it only keeps the registry in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartContract {
    pub address: Address,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        rename = "creator_address",
        alias = "creator",
        deserialize_with = "compat::opt_address_lenient"
    )]
    pub creator: Option<Address>,
    #[serde(default, alias = "bytecode")]
    pub code: String,
    #[serde(default)]
    pub abi: Value,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub created_at: u64,
    #[serde(default)]
    pub metadata: Value,
}

fn default_status() -> String {
    "active".to_string()
}
