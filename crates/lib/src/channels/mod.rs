//! Provider channels and the canonical inbound event.
//!
//! Provider modules walk webhook bodies and normalize provider messages; the resulting
//! [`BotInput`] is carried by the canonical [`Channel`] event.

mod inbound;
pub mod whatsapp;

pub use inbound::{BotInput, Channel, ChannelIntent, MessageType};
pub use whatsapp::{ChangeMetadata, WalkedMessage};
