//! In-process store: channels, users, and turns held in memory.
//!
//! Channels are seeded (from config or by tests); users and turns are created by the
//! callback pipeline. Users are unique per (number, channel id), the same constraint a
//! database-backed store enforces, so concurrent first contact converges on one record.
//!
//! Users live as long as the process. Turn records are kept for the most recent
//! [`DEFAULT_TURN_RETENTION`] turns only; [`MemoryStore::turn_count`] still counts every turn
//! created.

use crate::config::ChannelSeedConfig;
use crate::store::{CallbackStore, ChannelRecord, StoreError, TurnId, TurnRecord, UserRecord};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key for a channel binding (provider identifier + provider name).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct ChannelKey {
    identifier: String,
    provider: String,
}

/// Key for a user (sender number + channel id).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct UserKey {
    number: String,
    channel_id: String,
}

#[derive(Debug, Clone)]
struct ChannelEntry {
    record: ChannelRecord,
    active: bool,
}

/// Number of turn records a store keeps before evicting the oldest.
pub const DEFAULT_TURN_RETENTION: usize = 1024;

/// Recent turns, oldest first, plus the total ever created.
#[derive(Debug, Default)]
struct TurnLog {
    records: HashMap<TurnId, TurnRecord>,
    order: VecDeque<TurnId>,
    created: usize,
}

impl TurnLog {
    fn push(&mut self, turn: TurnRecord, retention: usize) {
        self.created += 1;
        self.order.push_back(turn.id.clone());
        self.records.insert(turn.id.clone(), turn);
        while self.order.len() > retention {
            if let Some(old) = self.order.pop_front() {
                self.records.remove(&old);
            }
        }
    }
}

pub struct MemoryStore {
    channels: Arc<RwLock<HashMap<ChannelKey, ChannelEntry>>>,
    users: Arc<RwLock<HashMap<UserKey, UserRecord>>>,
    turns: Arc<RwLock<TurnLog>>,
    turn_retention: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
            turns: Arc::new(RwLock::new(TurnLog::default())),
            turn_retention: DEFAULT_TURN_RETENTION,
        }
    }

    /// Keep at most `retention` turn records (minimum 1).
    pub fn with_turn_retention(mut self, retention: usize) -> Self {
        self.turn_retention = retention.max(1);
        self
    }

    /// Build a store holding the configured channel seeds.
    pub async fn from_seeds(seeds: &[ChannelSeedConfig]) -> Self {
        let store = Self::new();
        for seed in seeds {
            let id = seed
                .id
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("chan-{}", uuid::Uuid::new_v4()));
            store
                .add_channel(
                    ChannelRecord {
                        id,
                        identifier: seed.identifier.trim().to_string(),
                        provider: seed.provider.trim().to_string(),
                        bot_id: seed.bot_id.clone(),
                    },
                    seed.active,
                )
                .await;
        }
        log::debug!("memory store seeded with {} channel(s)", seeds.len());
        store
    }

    /// Insert or replace a channel binding.
    pub async fn add_channel(&self, record: ChannelRecord, active: bool) {
        let key = ChannelKey {
            identifier: record.identifier.clone(),
            provider: record.provider.clone(),
        };
        self.channels
            .write()
            .await
            .insert(key, ChannelEntry { record, active });
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Turns created since the store was built, including evicted ones.
    pub async fn turn_count(&self) -> usize {
        self.turns.read().await.created
    }

    /// Return a clone of the turn if it is still retained.
    pub async fn turn(&self, id: &str) -> Option<TurnRecord> {
        self.turns.read().await.records.get(id).cloned()
    }
}

#[async_trait]
impl CallbackStore for MemoryStore {
    async fn get_active_channel_by_identifier(
        &self,
        identifier: &str,
        provider: &str,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        let key = ChannelKey {
            identifier: identifier.to_string(),
            provider: provider.to_string(),
        };
        Ok(self
            .channels
            .read()
            .await
            .get(&key)
            .filter(|entry| entry.active)
            .map(|entry| entry.record.clone()))
    }

    async fn get_user_by_number(
        &self,
        number: &str,
        channel_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let key = UserKey {
            number: number.to_string(),
            channel_id: channel_id.to_string(),
        };
        Ok(self.users.read().await.get(&key).cloned())
    }

    async fn create_user(
        &self,
        channel_id: &str,
        number: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<UserRecord, StoreError> {
        let key = UserKey {
            number: number.to_string(),
            channel_id: channel_id.to_string(),
        };
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        let user = UserRecord {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            channel_id: channel_id.to_string(),
            number: number.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        users.insert(key, user.clone());
        Ok(user)
    }

    async fn create_turn(
        &self,
        bot_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<TurnId, StoreError> {
        let id = format!("turn-{}", uuid::Uuid::new_v4());
        let turn = TurnRecord {
            id: id.clone(),
            bot_id: bot_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.turns.write().await.push(turn, self.turn_retention);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(identifier: &str) -> ChannelRecord {
        ChannelRecord {
            id: "channel123".to_string(),
            identifier: identifier.to_string(),
            provider: "whatsapp".to_string(),
            bot_id: "bot123".to_string(),
        }
    }

    #[tokio::test]
    async fn inactive_channel_is_not_resolved() {
        let store = MemoryStore::new();
        store.add_channel(channel("919876543210"), false).await;
        let found = store
            .get_active_channel_by_identifier("919876543210", "whatsapp")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn channel_lookup_is_scoped_by_provider() {
        let store = MemoryStore::new();
        store.add_channel(channel("919876543210"), true).await;
        assert!(store
            .get_active_channel_by_identifier("919876543210", "telegram")
            .await
            .unwrap()
            .is_none());
        let found = store
            .get_active_channel_by_identifier("919876543210", "whatsapp")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.bot_id), Some("bot123".to_string()));
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected() {
        let store = MemoryStore::new();
        store
            .create_user("channel123", "919999999999", "Dummy", "Dummy")
            .await
            .unwrap();
        let second = store
            .create_user("channel123", "919999999999", "Dummy", "Dummy")
            .await;
        assert!(matches!(second, Err(StoreError::AlreadyExists)));
        // Same number on another channel is a different user.
        store
            .create_user("channel456", "919999999999", "Dummy", "Dummy")
            .await
            .unwrap();
        assert_eq!(store.user_count().await, 2);
    }

    #[tokio::test]
    async fn seeds_without_id_get_generated_ids() {
        let seeds = vec![ChannelSeedConfig {
            id: None,
            identifier: " 919876543210 ".to_string(),
            provider: "whatsapp".to_string(),
            bot_id: "bot123".to_string(),
            active: true,
        }];
        let store = MemoryStore::from_seeds(&seeds).await;
        let found = store
            .get_active_channel_by_identifier("919876543210", "whatsapp")
            .await
            .unwrap()
            .expect("seeded channel");
        assert!(found.id.starts_with("chan-"));
    }

    #[tokio::test]
    async fn created_turn_keeps_references() {
        let store = MemoryStore::new();
        let id = store.create_turn("bot123", "channel123", "user123").await.unwrap();
        let turn = store.turn(&id).await.expect("turn stored");
        assert_eq!(turn.bot_id, "bot123");
        assert_eq!(turn.channel_id, "channel123");
        assert_eq!(turn.user_id, "user123");
    }

    #[tokio::test]
    async fn oldest_turns_are_evicted_past_retention() {
        let store = MemoryStore::new().with_turn_retention(2);
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                store
                    .create_turn("bot123", "channel123", &format!("user{i}"))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(store.turn_count().await, 3);
        assert!(store.turn(&ids[0]).await.is_none());
        assert_eq!(store.turn(&ids[2]).await.map(|t| t.user_id), Some("user2".to_string()));
    }
}
