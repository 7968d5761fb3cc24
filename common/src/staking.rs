use crate::api::compat;
use crate::crypto::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StakingStatus {
    Pending,
    #[default]
    Active,
    Withdrawn,
    Completed,
    Cancelled,
}

impl StakingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakingStatus::Pending => "pending",
            StakingStatus::Active => "active",
            StakingStatus::Withdrawn => "withdrawn",
            StakingStatus::Completed => "completed",
            StakingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => StakingStatus::Pending,
            "withdrawn" => StakingStatus::Withdrawn,
            "completed" => StakingStatus::Completed,
            "cancelled" => StakingStatus::Cancelled,
            _ => StakingStatus::Active,
        }
    }

    /// Terminal records are frozen: no replication may mutate them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StakingStatus::Withdrawn | StakingStatus::Completed)
    }
}

impl Display for StakingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingRecord {
    #[serde(rename = "validator_address", alias = "validator")]
    pub validator: Address,
    #[serde(rename = "staker_address", alias = "staker")]
    pub staker: Address,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub reward_rate: Decimal,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub start_block: u64,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub end_block: Option<u64>,
    #[serde(default)]
    pub status: StakingStatus,
    #[serde(default, deserialize_with = "compat::decimal_lenient")]
    pub rewards_earned: Decimal,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub last_reward_block: u64,
    #[serde(default, deserialize_with = "compat::opt_address_lenient")]
    pub contract_address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(StakingStatus::Withdrawn.is_terminal());
        assert!(StakingStatus::Completed.is_terminal());
        assert!(!StakingStatus::Active.is_terminal());
        assert!(!StakingStatus::Pending.is_terminal());
        assert!(!StakingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn lossy_parse_defaults_to_active() {
        assert_eq!(StakingStatus::parse_lossy("WITHDRAWN"), StakingStatus::Withdrawn);
        assert_eq!(StakingStatus::parse_lossy("unknown"), StakingStatus::Active);
    }
}
