//! Gateway: HTTP surface around the callback pipeline.
//!
//! Single port serves the WhatsApp webhook (subscription handshake and deliveries), a health
//! probe, and a WebSocket stream of emitted channel events.

mod protocol;
mod server;

pub use protocol::{EventFrame, VerifyParams, WebhookAccepted, CHANNEL_IN_EVENT, SHUTDOWN_EVENT};
pub use server::{run_gateway, run_gateway_with_store, GatewayState};
