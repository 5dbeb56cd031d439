//! Errors raised while turning a webhook delivery into channel events.

use crate::store::StoreError;

/// Failure of one unit of callback processing (a message, a change, or the whole envelope).
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// No active channel is bound to the inbound display identifier for this provider.
    #[error("no active {provider} channel for identifier {identifier}")]
    ChannelNotFound { identifier: String, provider: String },
    /// Required nested structure is missing or has the wrong shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The backing store could not serve a lookup or create.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CallbackError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload(reason.into())
    }
}

impl From<StoreError> for CallbackError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            // Only reachable when a caller forwards a uniqueness violation it did not absorb.
            StoreError::AlreadyExists => Self::StoreUnavailable(e.to_string()),
        }
    }
}
