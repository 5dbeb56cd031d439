//! Gateway HTTP + WebSocket server (single port).

use crate::callback::CallbackHandler;
use crate::channels::Channel;
use crate::config::{self, Config};
use crate::gateway::protocol::{EventFrame, VerifyParams, WebhookAccepted};
use crate::init;
use crate::memory::MemoryStore;
use crate::store::CallbackStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared state for the gateway (config, callback pipeline, event fan-out).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, event subscribers must send `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
    /// Token expected in the webhook subscription handshake.
    pub verify_token: Option<String>,
    /// Broadcasts JSON event frames to connected subscribers.
    pub event_tx: broadcast::Sender<String>,
    /// Emitted channel events; the processor task receives.
    pub channel_tx: mpsc::Sender<Channel>,
    pub handler: Arc<CallbackHandler>,
}

/// Token required on the event stream; only when auth mode is token.
fn require_event_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Request headers as a plain map for the callback pipeline. Names are lowercase, repeated
/// headers are joined with `, `, and non-UTF-8 values are dropped.
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        map.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

/// Log one emitted event and broadcast it to subscribers.
fn publish_channel_event(state: &GatewayState, event: &Channel) {
    log::info!(
        "turn {}: inbound {} message",
        event.turn_id,
        event.bot_input.message_type
    );
    match EventFrame::channel_in(event).and_then(|frame| serde_json::to_string(&frame)) {
        Ok(text) => {
            let _ = state.event_tx.send(text);
        }
        Err(e) => log::warn!("failed to encode event for turn {}: {}", event.turn_id, e),
    }
}

/// Run the gateway with a memory store seeded from `config.channels`.
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    if config.channels.is_empty() {
        log::warn!("no channels configured; every inbound message will be skipped");
    }
    let store = Arc::new(MemoryStore::from_seeds(&config.channels).await);
    run_gateway_with_store(config, store).await
}

/// Run the gateway against any store implementation.
pub async fn run_gateway_with_store(config: Config, store: Arc<dyn CallbackStore>) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or INLET_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let verify_token = config::resolve_verify_token(&config);
    if verify_token.is_none() {
        log::info!("no webhook verify token configured; subscription handshakes will be refused");
    }
    let (event_tx, _) = broadcast::channel(64);
    let (channel_tx, mut channel_rx) = mpsc::channel::<Channel>(64);
    let handler = Arc::new(CallbackHandler::from_config(store, &config.ingest));
    log::info!(
        "callback pipeline ready (provider {}, concurrency {})",
        handler.provider(),
        config.ingest.concurrency.max(1)
    );

    let state = GatewayState {
        config: Arc::new(config.clone()),
        required_token: require_event_token(&config),
        verify_token,
        event_tx: event_tx.clone(),
        channel_tx,
        handler,
    };

    let processor: JoinHandle<()> = {
        let state_events = state.clone();
        tokio::spawn(async move {
            while let Some(event) = channel_rx.recv().await {
                publish_channel_event(&state_events, &event);
            }
        })
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/events", get(events_handler))
        .route("/whatsapp/webhook", get(whatsapp_verify).post(whatsapp_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("gateway server exited")?;
    processor.abort();
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event to subscribers so they can disconnect.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and draining connections");

    if let Ok(text) = serde_json::to_string(&EventFrame::shutdown()) {
        let _ = event_tx.send(text);
    }
}

/// GET /whatsapp/webhook: subscription handshake; echoes hub.challenge when the verify token matches.
async fn whatsapp_verify(
    State(state): State<GatewayState>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    let Some(ref expected) = state.verify_token else {
        return (StatusCode::FORBIDDEN, String::new());
    };
    let subscribing = params.mode.as_deref() == Some("subscribe");
    let token_ok = params.verify_token.as_deref() == Some(expected.as_str());
    match params.challenge {
        Some(challenge) if subscribing && token_ok => {
            log::info!("whatsapp webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            log::warn!("whatsapp webhook verification refused");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// POST /whatsapp/webhook: runs the delivery through the callback pipeline and queues each event.
async fn whatsapp_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let envelope: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("whatsapp webhook: invalid JSON body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid JSON body" })))
                .into_response();
        }
    };
    let headers = header_map(&headers);
    let context = json!({ "receivedAt": chrono::Utc::now().to_rfc3339() });
    let events = match state.handler.handle_callback(&envelope, &headers, &context) {
        Ok(events) => events,
        Err(e) => {
            log::warn!("whatsapp webhook rejected: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };
    futures_util::pin_mut!(events);
    let mut accepted = 0;
    while let Some(event) = events.next().await {
        if state.channel_tx.send(event).await.is_err() {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        accepted += 1;
    }
    Json(WebhookAccepted { accepted }).into_response()
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "provider": state.handler.provider(),
    }))
}

/// GET /events upgrades to WebSocket and streams event frames.
async fn events_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(ref expected) = state.required_token {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    let event_rx = state.event_tx.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, event_rx))
}

async fn stream_events(mut socket: WebSocket, mut event_rx: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = serde_json::from_str::<EventFrame>(&text)
                            .map(|f| f.is_shutdown())
                            .unwrap_or(false);
                        if socket.send(Message::Text(text)).await.is_err() || is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("events client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    log::debug!("events client disconnected");
}
