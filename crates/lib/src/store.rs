//! Store boundary: the lookups and creates the callback pipeline needs from persistence.
//!
//! The pipeline never owns storage. It calls these four operations and treats the
//! implementation as an external service (database, RPC, or the in-process [`MemoryStore`]).
//!
//! [`MemoryStore`]: crate::memory::MemoryStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque turn identifier returned by the store.
pub type TurnId = String;

/// A configured messaging endpoint bound to a bot. Resolved, never created, by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    /// Provider-facing identifier (for WhatsApp, the display phone number).
    pub identifier: String,
    pub provider: String,
    pub bot_id: String,
}

/// A sender known to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub channel_id: String,
    pub number: String,
    pub first_name: String,
    pub last_name: String,
}

/// One conversational turn. The pipeline only sees its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: TurnId,
    pub bot_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Uniqueness violation, e.g. a user for (number, channel) was created concurrently.
    #[error("record already exists")]
    AlreadyExists,
}

/// Persistence operations consumed by the callback pipeline.
#[async_trait]
pub trait CallbackStore: Send + Sync {
    /// Active channel for a provider identifier, or `None` when no active channel matches.
    async fn get_active_channel_by_identifier(
        &self,
        identifier: &str,
        provider: &str,
    ) -> Result<Option<ChannelRecord>, StoreError>;

    async fn get_user_by_number(
        &self,
        number: &str,
        channel_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// Create a user. Must return [`StoreError::AlreadyExists`] when (number, channel_id) is taken.
    async fn create_user(
        &self,
        channel_id: &str,
        number: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<UserRecord, StoreError>;

    async fn create_turn(
        &self,
        bot_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<TurnId, StoreError>;
}
