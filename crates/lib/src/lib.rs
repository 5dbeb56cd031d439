//! Inlet core library: turns inbound messaging-provider webhooks into canonical channel
//! events, resolving the receiving channel and the sending user along the way.

pub mod callback;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod init;
pub mod memory;
pub mod store;
pub mod turn;

pub use callback::CallbackHandler;
pub use error::CallbackError;
pub use store::{CallbackStore, ChannelRecord, StoreError, TurnId, UserRecord};
