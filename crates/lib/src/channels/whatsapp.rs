//! WhatsApp Cloud webhook shape: walk `entry[].changes[].value.messages[]` and normalize
//! each provider message into a [`BotInput`].
//!
//! Deliveries mix message changes with status-only changes and occasionally carry partial
//! structures, so every scope below the envelope fails soft: a bad entry or change
//! contributes zero messages and its siblings are still walked.

use crate::channels::inbound::{BotInput, MessageType};
use crate::error::CallbackError;
use serde_json::{Map, Value};

/// Keys of the provider envelope that are not part of the canonical payload.
const ENVELOPE_KEYS: [&str; 3] = ["from", "id", "context"];

/// Metadata of the change a message was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMetadata {
    /// Business number that received the message; the channel lookup key.
    pub display_phone_number: String,
    pub phone_number_id: Option<String>,
    pub messaging_product: Option<String>,
    /// Change field tag (e.g. "messages").
    pub field: Option<String>,
}

/// One raw provider message paired with its enclosing change metadata.
#[derive(Debug, Clone)]
pub struct WalkedMessage {
    pub metadata: ChangeMetadata,
    pub message: Map<String, Value>,
}

impl WalkedMessage {
    /// Sender number (`from`), when present.
    pub fn sender(&self) -> Option<&str> {
        self.message.get("from").and_then(Value::as_str)
    }

    /// Provider message id, for logs.
    pub fn message_id(&self) -> &str {
        self.message
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
    }
}

/// Walk a webhook body and yield each message in document order (entries → changes → messages).
///
/// Only an envelope that is not an object with an `entry` list is an error; anything deeper
/// that is missing or malformed is logged and skipped.
pub fn walk(envelope: &Value) -> Result<impl Iterator<Item = WalkedMessage> + '_, CallbackError> {
    let root = envelope
        .as_object()
        .ok_or_else(|| CallbackError::malformed("webhook body is not a JSON object"))?;
    let entries = root
        .get("entry")
        .and_then(Value::as_array)
        .ok_or_else(|| CallbackError::malformed("webhook body has no entry list"))?;
    if let Some(object) = root.get("object").and_then(Value::as_str) {
        log::debug!("walking webhook for {} with {} entr(ies)", object, entries.len());
    }
    Ok(entries
        .iter()
        .enumerate()
        .flat_map(|(index, entry)| entry_changes(index, entry).iter())
        .flat_map(|change| change_messages(change)))
}

fn entry_changes(index: usize, entry: &Value) -> &[Value] {
    match entry.get("changes").and_then(Value::as_array) {
        Some(changes) => changes.as_slice(),
        None => {
            log::warn!(
                "webhook entry {} ({}) has no changes list, skipping",
                index,
                entry.get("id").and_then(Value::as_str).unwrap_or("<no id>")
            );
            &[]
        }
    }
}

fn change_messages(change: &Value) -> impl Iterator<Item = WalkedMessage> + '_ {
    let scope = match change_scope(change) {
        Ok(scope) => scope,
        Err(e) => {
            log::warn!("skipping webhook change: {}", e);
            None
        }
    };
    scope.into_iter().flat_map(|(metadata, messages)| {
        messages.iter().filter_map(move |raw| match raw.as_object() {
            Some(message) => Some(WalkedMessage {
                metadata: metadata.clone(),
                message: message.clone(),
            }),
            None => {
                log::debug!("skipping non-object message in change");
                None
            }
        })
    })
}

/// Metadata and message list of one change. `Ok(None)` for changes without messages
/// (status callbacks and other non-message fields).
fn change_scope(change: &Value) -> Result<Option<(ChangeMetadata, &[Value])>, CallbackError> {
    let field = change.get("field").and_then(Value::as_str).map(str::to_string);
    let value = change
        .get("value")
        .and_then(Value::as_object)
        .ok_or_else(|| CallbackError::malformed("change has no value object"))?;
    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        log::debug!(
            "change (field {}) carries no messages",
            field.as_deref().unwrap_or("<none>")
        );
        return Ok(None);
    };
    let metadata = value
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| CallbackError::malformed("change value has messages but no metadata"))?;
    let display_phone_number = metadata
        .get("display_phone_number")
        .and_then(Value::as_str)
        .ok_or_else(|| CallbackError::malformed("metadata has no display_phone_number"))?
        .to_string();
    let metadata = ChangeMetadata {
        display_phone_number,
        phone_number_id: metadata
            .get("phone_number_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        messaging_product: value
            .get("messaging_product")
            .and_then(Value::as_str)
            .map(str::to_string),
        field,
    };
    Ok(Some((metadata, messages.as_slice())))
}

/// Convert one provider message into a [`BotInput`]: the message without `from`, `id`, and
/// `context`, discriminated by its `type` tag. Tags are not validated so new provider types
/// pass through.
pub fn normalize(message: &Map<String, Value>) -> Result<BotInput, CallbackError> {
    let message_type = message
        .get("type")
        .and_then(Value::as_str)
        .map(MessageType::from)
        .ok_or_else(|| CallbackError::malformed("message has no type tag"))?;
    if let Some(reply_to) = message
        .get("context")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)
    {
        log::debug!("message replies to provider message {}", reply_to);
    }
    let data: Map<String, Value> = message
        .iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(BotInput { message_type, data })
}
