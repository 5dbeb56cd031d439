//! Webhook callback handling: one inbound delivery in, a stream of [`Channel`] events out.
//!
//! For each message the walker finds, the handler normalizes the message, resolves the
//! receiving channel and the sending user, creates a turn, and emits `Channel(turn_id,
//! ChannelIn, bot_input)`. A message that fails any step is logged and skipped; its
//! siblings are still processed. Only an envelope without an entry list fails the call.

use crate::channels::Channel;
use crate::channels::whatsapp::{self, WalkedMessage};
use crate::config::IngestConfig;
use crate::error::CallbackError;
use crate::identity;
use crate::store::CallbackStore;
use crate::turn;
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider name used for channel lookup when none is configured.
pub const DEFAULT_PROVIDER: &str = "whatsapp";

/// Runs webhook deliveries through the normalization and identity pipeline.
#[derive(Clone)]
pub struct CallbackHandler {
    store: Arc<dyn CallbackStore>,
    provider: String,
    concurrency: usize,
}

impl CallbackHandler {
    pub fn new(store: Arc<dyn CallbackStore>) -> Self {
        Self {
            store,
            provider: DEFAULT_PROVIDER.to_string(),
            concurrency: 1,
        }
    }

    pub fn from_config(store: Arc<dyn CallbackStore>, ingest: &IngestConfig) -> Self {
        Self::new(store)
            .with_provider(ingest.provider.clone())
            .with_concurrency(ingest.concurrency)
    }

    /// Provider name passed to channel lookup (e.g. "whatsapp").
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Messages of one delivery processed at once. Events are still emitted in discovery order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Process one webhook delivery.
    ///
    /// The returned stream is lazy and single-pass: store calls happen as it is polled, and
    /// it yields one event per successfully processed message. `headers` and `context` are
    /// caller-level inputs (signature checks, tracing) and are not interpreted here.
    pub fn handle_callback<'a>(
        &'a self,
        envelope: &'a Value,
        _headers: &HashMap<String, String>,
        _context: &Value,
    ) -> Result<impl Stream<Item = Channel> + Send + 'a, CallbackError> {
        let messages = whatsapp::walk(envelope)?;
        Ok(stream::iter(messages)
            .map(move |walked| self.process(walked))
            .buffered(self.concurrency)
            .filter_map(future::ready))
    }

    async fn process(&self, walked: WalkedMessage) -> Option<Channel> {
        let message_id = walked.message_id().to_string();
        let identifier = walked.metadata.display_phone_number.clone();
        match self.process_message(walked).await {
            Ok(event) => {
                log::debug!("message {} to {} became turn {}", message_id, identifier, event.turn_id);
                Some(event)
            }
            Err(e) => {
                log::warn!("skipping message {} to {}: {}", message_id, identifier, e);
                None
            }
        }
    }

    async fn process_message(&self, walked: WalkedMessage) -> Result<Channel, CallbackError> {
        let sender = walked
            .sender()
            .ok_or_else(|| CallbackError::malformed("message has no sender"))?;
        let bot_input = whatsapp::normalize(&walked.message)?;
        let store = self.store.as_ref();
        let channel =
            identity::resolve_channel(store, &walked.metadata.display_phone_number, &self.provider)
                .await?;
        let user = identity::resolve_user(store, sender, &channel.id).await?;
        let turn_id = turn::create_turn(store, &channel, &user).await?;
        Ok(Channel::inbound(turn_id, bot_input))
    }
}
