//! Inbound WebSocket endpoint.
//!
//! Provides:
//! - GET /chat?username=... (WebSocket upgrade; one relay per connection)
//! - GET /health

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tcpbridge_wire::ConnectionId;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{InboundError, RelayError};
use crate::registry::{RelayFactory, SessionRegistry};
use crate::relay::{InboundChannel, InboundEvent, ResilientRelay};

/// Outgoing frames buffered per inbound connection.
const OUTBOUND_BUFFER: usize = 64;

/// Shared endpoint state.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub factory: Arc<RelayFactory>,
}

impl GatewayState {
    pub fn new(registry: Arc<SessionRegistry>, factory: Arc<RelayFactory>) -> Self {
        Self { registry, factory }
    }
}

#[derive(Debug, Deserialize)]
struct ChatQuery {
    username: String,
}

/// Inbound channel backed by a WebSocket writer task.
pub struct WsInbound {
    tx: mpsc::Sender<Message>,
}

impl WsInbound {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl InboundChannel for WsInbound {
    async fn send(&self, method: &str, payload: String) -> Result<(), InboundError> {
        let frame = serde_json::to_string(&InboundEvent::new(method, payload))?;
        self.tx
            .send(Message::Text(frame.into()))
            .await
            .map_err(|_| InboundError::Closed)
    }
}

/// Build the gateway router.
pub fn create_router(state: GatewayState, cors_origin: Option<HeaderValue>) -> Router {
    let router = Router::new()
        .route("/chat", get(chat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors_origin {
        Some(origin) => router.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::exact(origin))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true),
        ),
        None => router,
    }
}

async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.registry.len().await,
    }))
}

async fn chat_handler(
    State(state): State<GatewayState>,
    Query(query): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.username))
}

async fn handle_socket(socket: WebSocket, state: GatewayState, username: String) {
    let connection_id = ConnectionId::new();
    let span = tracing::info_span!("connection", connection_id = %connection_id);

    async move {
        debug!(username = %username, "User connected");

        let Some(relay) = register_relay(&state, connection_id).await else {
            warn!("Connection id already registered, closing inbound connection");
            return;
        };

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        // Writer: closes the socket once every sender is gone
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if ws_tx.send(msg).await.is_err() {
                    return;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        let inbound: Arc<dyn InboundChannel> = Arc::new(WsInbound::new(tx));
        let registry = Arc::clone(&state.registry);
        tokio::spawn(
            async move {
                match relay.start(inbound).await {
                    Ok(()) => info!("Relay finished"),
                    Err(RelayError::Cancelled) => debug!("Relay cancelled"),
                    Err(e) => error!(error = %e, "Relay failed, closing inbound connection"),
                }
                registry.remove(&connection_id).await;
            }
            .in_current_span(),
        );

        // Clients only connect and disconnect; anything else is ignored
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }

        if state.registry.stop(&connection_id).await {
            info!(username = %username, "User disconnected, relay stopped");
        } else {
            debug!(username = %username, "User disconnected");
        }
    }
    .instrument(span)
    .await
}

/// Create a relay for `connection_id` and register it. Returns `None`, leaving
/// the existing entry untouched, if the id is already taken.
async fn register_relay(
    state: &GatewayState,
    connection_id: ConnectionId,
) -> Option<Arc<ResilientRelay>> {
    let relay = Arc::new(state.factory.create(connection_id));
    if state
        .registry
        .insert(connection_id, Arc::clone(&relay))
        .await
    {
        Some(relay)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelaySettings, RetryPolicy};
    use tcpbridge_wire::{TcpConnector, DEFAULT_BACKEND_ADDR};

    fn state() -> GatewayState {
        GatewayState::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(RelayFactory::new(
                Arc::new(TcpConnector::new(DEFAULT_BACKEND_ADDR)),
                RelaySettings::default(),
                RetryPolicy::default(),
            )),
        )
    }

    #[tokio::test]
    async fn test_register_relay_keeps_existing_entry() {
        let state = state();
        let id = ConnectionId::new();

        let first = register_relay(&state, id).await.unwrap();
        assert!(register_relay(&state, id).await.is_none());

        let registered = state.registry.get(&id).await.unwrap();
        assert!(Arc::ptr_eq(&registered, &first));
        assert_eq!(state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_ws_inbound_frames_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let inbound = WsInbound::new(tx);

        inbound.send("Update", "hello".to_string()).await.unwrap();

        match rx.recv().await {
            Some(Message::Text(text)) => {
                let event: InboundEvent = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(event, InboundEvent::new("Update", "hello".to_string()));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ws_inbound_closed() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let inbound = WsInbound::new(tx);

        let err = inbound.send("Update", "x".to_string()).await.unwrap_err();
        assert!(matches!(err, InboundError::Closed));
    }
}
