//! Gateway wire types: event frames for subscribers and webhook query/response bodies.

use crate::channels::Channel;
use serde::{Deserialize, Serialize};

/// Event name for an emitted inbound channel event.
pub const CHANNEL_IN_EVENT: &str = "channel.in";

/// Event name broadcast when the gateway stops.
pub const SHUTDOWN_EVENT: &str = "shutdown";

/// Wire event: `{ "type": "event", "event", "payload" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub typ: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "event".to_string(),
            event: event.into(),
            payload,
        }
    }

    pub fn channel_in(channel: &Channel) -> serde_json::Result<Self> {
        Ok(Self::new(CHANNEL_IN_EVENT, serde_json::to_value(channel)?))
    }

    pub fn shutdown() -> Self {
        Self::new(SHUTDOWN_EVENT, serde_json::json!({}))
    }

    pub fn is_shutdown(&self) -> bool {
        self.event == SHUTDOWN_EVENT
    }
}

/// Query of the webhook subscription handshake (`GET ?hub.mode=subscribe&hub.verify_token=..&hub.challenge=..`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Response body for an accepted webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAccepted {
    /// Events emitted for this delivery.
    pub accepted: usize,
}
