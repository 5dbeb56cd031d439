//! Canonical inbound event: one turn id plus the provider-agnostic bot input.

use crate::store::TurnId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Direction of a channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelIntent {
    /// Message arriving from the user; the only value the callback pipeline emits.
    ChannelIn,
    ChannelOut,
}

/// Provider message type tag. Unknown tags are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Text,
    Audio,
    Image,
    Video,
    Document,
    Sticker,
    Location,
    Contacts,
    Interactive,
    Button,
    Reaction,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Audio => "audio",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::Contacts => "contacts",
            MessageType::Interactive => "interactive",
            MessageType::Button => "button",
            MessageType::Reaction => "reaction",
            MessageType::Other(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MessageType::Other(_))
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        match tag {
            "text" => MessageType::Text,
            "audio" => MessageType::Audio,
            "image" => MessageType::Image,
            "video" => MessageType::Video,
            "document" => MessageType::Document,
            "sticker" => MessageType::Sticker,
            "location" => MessageType::Location,
            "contacts" => MessageType::Contacts,
            "interactive" => MessageType::Interactive,
            "button" => MessageType::Button,
            "reaction" => MessageType::Reaction,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(MessageType::from(tag.as_str()))
    }
}

/// Provider-agnostic payload of one inbound message.
///
/// `data` holds the provider's message object without its envelope keys (`from`, `id`,
/// `context`): the type-specific sub-object, `timestamp`, and `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotInput {
    pub message_type: MessageType,
    pub data: Map<String, Value>,
}

/// One inbound interaction turn, emitted per processed provider message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub turn_id: TurnId,
    pub intent: ChannelIntent,
    pub bot_input: BotInput,
}

impl Channel {
    pub fn inbound(turn_id: TurnId, bot_input: BotInput) -> Self {
        Self {
            turn_id,
            intent: ChannelIntent::ChannelIn,
            bot_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_message_type_round_trips_verbatim() {
        let t: MessageType = serde_json::from_value(json!("order")).unwrap();
        assert_eq!(t, MessageType::Other("order".to_string()));
        assert!(!t.is_known());
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("order"));
    }

    #[test]
    fn channel_serializes_with_inbound_intent() {
        let mut data = Map::new();
        data.insert("timestamp".to_string(), json!("1714990325"));
        data.insert("text".to_string(), json!({ "body": "hi" }));
        data.insert("type".to_string(), json!("text"));
        let event = Channel::inbound(
            "turn123".to_string(),
            BotInput {
                message_type: MessageType::Text,
                data,
            },
        );
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["turn_id"], "turn123");
        assert_eq!(v["intent"], "channel_in");
        assert_eq!(v["bot_input"]["message_type"], "text");
        assert_eq!(v["bot_input"]["data"]["text"]["body"], "hi");
    }
}
