// Stake-weighted validator selection, seeded from the chain itself so
// every node that agrees on the parent block agrees on the pick.

use nodesync_common::{
    crypto::{sha256, Hash},
    validator::Validator,
};
use rust_decimal::Decimal;

/// First 8 hex characters of `sha256(parent_hash || next_height)` as an
/// unsigned 32-bit seed.
pub fn selection_seed(parent_hash: &Hash, next_height: u64) -> u32 {
    let digest = sha256(format!("{}{}", parent_hash, next_height).as_bytes());
    let hex = digest.to_hex();
    u32::from_str_radix(&hex[..8], 16).unwrap_or(0)
}

/// Weighted pick over the cumulative stake distribution. The seed is
/// scaled onto the total stake; a stake-less candidate set falls back to
/// a uniform pick.
pub fn pick_validator(validators: &[Validator], seed: u32) -> Option<&Validator> {
    if validators.is_empty() {
        return None;
    }

    let total: Decimal = validators
        .iter()
        .map(|v| v.stake.max(Decimal::ZERO))
        .sum();
    if total <= Decimal::ZERO {
        return validators.get(seed as usize % validators.len());
    }

    let ticket = Decimal::from(seed) * total / Decimal::from(1u64 << 32);
    let mut cumulative = Decimal::ZERO;
    for validator in validators {
        cumulative += validator.stake.max(Decimal::ZERO);
        if ticket < cumulative {
            return Some(validator);
        }
    }
    validators.last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodesync_common::crypto::Address;
    use serde_json::Value;

    fn validator(suffix: u8, stake: u64) -> Validator {
        let address =
            Address::parse(&format!("0x{:040x}", suffix as u128)).unwrap();
        Validator {
            address,
            public_key: String::new(),
            stake: Decimal::from(stake),
            delegated_stake: Decimal::ZERO,
            commission_rate: Decimal::ZERO,
            status: "active".to_string(),
            blocks_produced: 0,
            blocks_missed: 0,
            last_active_block: None,
            jail_until_block: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn seed_is_deterministic() {
        let parent = sha256(b"parent");
        assert_eq!(selection_seed(&parent, 7), selection_seed(&parent, 7));
        assert_ne!(selection_seed(&parent, 7), selection_seed(&parent, 8));
    }

    #[test]
    fn empty_set_yields_none() {
        assert!(pick_validator(&[], 42).is_none());
    }

    #[test]
    fn zero_stake_falls_back_to_uniform() {
        let set = vec![validator(1, 0), validator(2, 0), validator(3, 0)];
        let picked = pick_validator(&set, 4).unwrap();
        assert_eq!(picked.address, set[1].address);
    }

    #[test]
    fn stakeless_validator_is_never_picked_among_staked() {
        let set = vec![validator(1, 0), validator(2, 100)];
        for seed in [0u32, 1, 1000, u32::MAX / 2, u32::MAX] {
            let picked = pick_validator(&set, seed).unwrap();
            assert_eq!(picked.address, set[1].address, "seed {}", seed);
        }
    }

    #[test]
    fn extreme_seeds_stay_in_bounds() {
        let set = vec![validator(1, 10), validator(2, 20), validator(3, 30)];
        assert!(pick_validator(&set, 0).is_some());
        assert!(pick_validator(&set, u32::MAX).is_some());
    }

    #[test]
    fn low_seed_lands_in_first_bucket() {
        let set = vec![validator(1, 50), validator(2, 50)];
        let picked = pick_validator(&set, 0).unwrap();
        assert_eq!(picked.address, set[0].address);
    }
}
