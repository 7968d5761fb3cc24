// Wire shapes for the peer explorer API.
//
// Peers answer in two envelope generations: the current
// `{success, data, pagination}` object and a legacy top-level array. Both
// are accepted everywhere a list is expected.

pub mod compat;

use crate::crypto::Hash;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("peer rejected request: {0}")]
    Rejected(String),
    #[error("peer response is missing the data field")]
    MissingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub page: Option<u64>,
    #[serde(default, deserialize_with = "compat::opt_u64_lenient")]
    pub total: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiEnvelope<T> {
    Wrapped {
        success: bool,
        data: Option<T>,
        #[serde(default)]
        pagination: Option<Pagination>,
        #[serde(default)]
        message: Option<String>,
    },
    Legacy(T),
}

impl<T> ApiEnvelope<T> {
    pub fn into_parts(self) -> Result<(T, Option<Pagination>), EnvelopeError> {
        match self {
            ApiEnvelope::Wrapped {
                success,
                data,
                pagination,
                message,
            } => {
                if !success {
                    return Err(EnvelopeError::Rejected(message.unwrap_or_default()));
                }
                let data = data.ok_or(EnvelopeError::MissingData)?;
                Ok((data, pagination))
            }
            ApiEnvelope::Legacy(data) => Ok((data, None)),
        }
    }
}

/// One `(height, hash)` pair as served by `get_tip_hashes` and
/// `get_block_hashes_range`.
#[derive(Debug, Clone, Deserialize)]
pub struct TipHash {
    #[serde(deserialize_with = "compat::u64_lenient", alias = "block_height")]
    pub height: u64,
    #[serde(alias = "block_hash")]
    pub hash: Hash,
}

/// Summary row from `get_network_stats`. Whether `total_transactions`
/// includes the mempool varies across peer versions; callers treat it as
/// advisory only.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkStats {
    #[serde(
        default,
        deserialize_with = "compat::opt_u64_lenient",
        alias = "block_height",
        alias = "tip_height"
    )]
    pub height: Option<u64>,
    #[serde(
        default,
        deserialize_with = "compat::opt_u64_lenient",
        alias = "transaction_count",
        alias = "tx_count"
    )]
    pub total_transactions: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_envelope() {
        let raw = r#"{"success":true,"data":[1,2,3],"pagination":{"has_more":true,"page":"2"}}"#;
        let envelope: ApiEnvelope<Vec<u64>> = serde_json::from_str(raw).unwrap();
        let (data, pagination) = envelope.into_parts().unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        let pagination = pagination.unwrap();
        assert!(pagination.has_more);
        assert_eq!(pagination.page, Some(2));
    }

    #[test]
    fn legacy_envelope() {
        let raw = "[4,5]";
        let envelope: ApiEnvelope<Vec<u64>> = serde_json::from_str(raw).unwrap();
        let (data, pagination) = envelope.into_parts().unwrap();
        assert_eq!(data, vec![4, 5]);
        assert!(pagination.is_none());
    }

    #[test]
    fn rejected_envelope() {
        let raw = r#"{"success":false,"message":"unknown action"}"#;
        let envelope: ApiEnvelope<Vec<u64>> = serde_json::from_str(raw).unwrap();
        match envelope.into_parts() {
            Err(EnvelopeError::Rejected(message)) => assert_eq!(message, "unknown action"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn tip_hash_accepts_string_heights() {
        let raw = r#"{"height":"42","hash":"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"}"#;
        let tip: TipHash = serde_json::from_str(raw).unwrap();
        assert_eq!(tip.height, 42);
    }

    #[test]
    fn network_stats_aliases() {
        let raw = r#"{"block_height":7,"transaction_count":"120"}"#;
        let stats: NetworkStats = serde_json::from_str(raw).unwrap();
        assert_eq!(stats.height, Some(7));
        assert_eq!(stats.total_transactions, Some(120));
    }
}
