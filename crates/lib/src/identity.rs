//! Identity resolution: which channel received a message and which user sent it.

use crate::error::CallbackError;
use crate::store::{CallbackStore, ChannelRecord, StoreError, UserRecord};

/// Name given to users created on first contact; the provider profile name is not applied.
pub const PLACEHOLDER_NAME: &str = "Dummy";

/// Resolve the active channel bound to `identifier` for `provider`.
///
/// A missing channel means the bot is not configured for this number; the caller skips the
/// message instead of retrying.
pub async fn resolve_channel(
    store: &dyn CallbackStore,
    identifier: &str,
    provider: &str,
) -> Result<ChannelRecord, CallbackError> {
    store
        .get_active_channel_by_identifier(identifier, provider)
        .await?
        .ok_or_else(|| CallbackError::ChannelNotFound {
            identifier: identifier.to_string(),
            provider: provider.to_string(),
        })
}

/// Resolve the user for `number` on `channel_id`, creating it on first contact.
///
/// Redelivered webhooks can race on creation. A uniqueness violation from the store means
/// another delivery created the user first, so the record is read back and returned.
pub async fn resolve_user(
    store: &dyn CallbackStore,
    number: &str,
    channel_id: &str,
) -> Result<UserRecord, CallbackError> {
    if let Some(user) = store.get_user_by_number(number, channel_id).await? {
        return Ok(user);
    }
    match store
        .create_user(channel_id, number, PLACEHOLDER_NAME, PLACEHOLDER_NAME)
        .await
    {
        Ok(user) => {
            log::info!("created user {} for {} on channel {}", user.id, number, channel_id);
            Ok(user)
        }
        Err(StoreError::AlreadyExists) => {
            log::debug!("user {} on channel {} created concurrently, reading back", number, channel_id);
            store
                .get_user_by_number(number, channel_id)
                .await?
                .ok_or_else(|| {
                    CallbackError::StoreUnavailable(format!(
                        "user {} on channel {} reported as existing but not found",
                        number, channel_id
                    ))
                })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::TurnId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store where another writer wins the creation race: the first lookup misses and create
    /// reports a duplicate. Later lookups see the winner's record only when `readable`.
    struct LostRaceStore {
        lookups: AtomicUsize,
        readable: bool,
    }

    fn winner() -> UserRecord {
        UserRecord {
            id: "user-winner".to_string(),
            channel_id: "channel123".to_string(),
            number: "919999999999".to_string(),
            first_name: PLACEHOLDER_NAME.to_string(),
            last_name: PLACEHOLDER_NAME.to_string(),
        }
    }

    #[async_trait]
    impl CallbackStore for LostRaceStore {
        async fn get_active_channel_by_identifier(
            &self,
            _identifier: &str,
            _provider: &str,
        ) -> Result<Option<ChannelRecord>, StoreError> {
            Ok(None)
        }

        async fn get_user_by_number(
            &self,
            _number: &str,
            _channel_id: &str,
        ) -> Result<Option<UserRecord>, StoreError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 || !self.readable {
                Ok(None)
            } else {
                Ok(Some(winner()))
            }
        }

        async fn create_user(
            &self,
            _channel_id: &str,
            _number: &str,
            _first_name: &str,
            _last_name: &str,
        ) -> Result<UserRecord, StoreError> {
            Err(StoreError::AlreadyExists)
        }

        async fn create_turn(
            &self,
            _bot_id: &str,
            _channel_id: &str,
            _user_id: &str,
        ) -> Result<TurnId, StoreError> {
            Err(StoreError::Unavailable("not used".to_string()))
        }
    }

    #[tokio::test]
    async fn unknown_channel_is_channel_not_found() {
        let store = MemoryStore::new();
        let err = resolve_channel(&store, "919876543210", "whatsapp")
            .await
            .unwrap_err();
        match err {
            CallbackError::ChannelNotFound { identifier, provider } => {
                assert_eq!(identifier, "919876543210");
                assert_eq!(provider, "whatsapp");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn first_contact_creates_placeholder_user() {
        let store = MemoryStore::new();
        let user = resolve_user(&store, "919999999999", "channel123").await.unwrap();
        assert_eq!(user.first_name, "Dummy");
        assert_eq!(user.last_name, "Dummy");
        let again = resolve_user(&store, "919999999999", "channel123").await.unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn lost_creation_race_resolves_to_existing_user() {
        let store = LostRaceStore {
            lookups: AtomicUsize::new(0),
            readable: true,
        };
        let user = resolve_user(&store, "919999999999", "channel123").await.unwrap();
        assert_eq!(user, winner());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_without_readable_record_is_store_unavailable() {
        let store = LostRaceStore {
            lookups: AtomicUsize::new(0),
            readable: false,
        };
        let err = resolve_user(&store, "919999999999", "channel123")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::StoreUnavailable(_)));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_contact_yields_one_user() {
        let store = MemoryStore::new();
        let (a, b) = tokio::join!(
            resolve_user(&store, "919999999999", "channel123"),
            resolve_user(&store, "919999999999", "channel123"),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(store.user_count().await, 1);
    }
}
