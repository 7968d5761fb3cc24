use thiserror::Error;

/// Error type for peer HTTP operations.
///
/// The client performs no retries; callers decide whether a failure is
/// tolerated (probing), falls through to another endpoint (replication),
/// or aborts the round.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("unexpected HTTP status {0} from {1}")]
    Status(u16, String),

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ClientError {
    pub(crate) fn decode(url: &str, reason: impl ToString) -> Self {
        ClientError::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
