//! End-to-end relay test.
//!
//! Runs the backend socket server and the gateway in-process on ephemeral
//! ports and drives them with a real WebSocket client, verifying:
//!
//! 1. A browser connection opens a backend session
//! 2. Backend text reaches the browser as an `Update` event
//! 3. The gateway keeps the backend session alive with pings
//! 4. Closing the browser connection releases the backend session
//! 5. A relay that ends, normally or after exhausting retries, closes the
//!    browser connection
//! 6. A connection without a username is rejected
//!
//! ## Running
//!
//! ```bash
//! cargo test -p tcpbridge-e2e --test relay_roundtrip
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tcpbridge_backend::{BackendServer, ConnectionRegistry, ListenerConfig, ReceivedMessage};
use tcpbridge_gateway::{
    create_router, BackoffPolicy, GatewayState, RelayFactory, RelaySettings, RetryPolicy,
    SessionRegistry,
};
use tcpbridge_wire::TcpConnector;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct Stack {
    gateway_addr: SocketAddr,
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    received: mpsc::UnboundedReceiver<ReceivedMessage>,
    _shutdown: watch::Sender<bool>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tcpbridge_gateway=debug,tcpbridge_backend=debug")
        .with_test_writer()
        .try_init();
}

async fn start_stack(keepalive_interval: Duration) -> Stack {
    init_tracing();

    let connections = Arc::new(ConnectionRegistry::new());
    let (received_tx, received) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);

    let backend = Arc::new(
        BackendServer::bind(
            ListenerConfig::new("127.0.0.1:0".parse().unwrap()),
            Arc::clone(&connections),
            received_tx,
        )
        .await
        .unwrap(),
    );
    let backend_addr = backend.local_addr().unwrap();
    tokio::spawn(Arc::clone(&backend).run(shutdown_rx));

    let settings = RelaySettings {
        keepalive_interval,
        shutdown_grace: Duration::from_secs(2),
        ..RelaySettings::default()
    };
    let (gateway_addr, sessions) =
        start_gateway(backend_addr, settings, RetryPolicy::default()).await;

    Stack {
        gateway_addr,
        sessions,
        connections,
        received,
        _shutdown: shutdown,
    }
}

async fn start_gateway(
    backend_addr: SocketAddr,
    settings: RelaySettings,
    policy: RetryPolicy,
) -> (SocketAddr, Arc<SessionRegistry>) {
    let factory = Arc::new(RelayFactory::new(
        Arc::new(TcpConnector::new(backend_addr)),
        settings,
        policy,
    ));
    let sessions = Arc::new(SessionRegistry::new());
    let app = create_router(GatewayState::new(Arc::clone(&sessions), factory), None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (gateway_addr, sessions)
}

/// Read frames until the gateway sends a close frame. Fails on any text frame.
async fn expect_close(ws: &mut WsClient) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("gateway did not close the connection within 5s");
        match frame {
            Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected text frame: {text:?}"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("connection failed before a close frame: {e}"),
            None => panic!("connection ended without a close frame"),
        }
    }
}

async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let max_wait = Duration::from_secs(5);
    let start = std::time::Instant::now();
    while !check().await {
        if start.elapsed() > max_wait {
            panic!("{what} did not happen within {max_wait:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_backend_text_reaches_browser() {
    let stack = start_stack(Duration::from_secs(30)).await;

    let url = format!("ws://{}/chat?username=alice", stack.gateway_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let connections = Arc::clone(&stack.connections);
    wait_until("backend connection", || {
        let connections = Arc::clone(&connections);
        async move { connections.len().await == 1 }
    })
    .await;
    assert_eq!(stack.sessions.len().await, 1);

    let id = stack.connections.connection_ids().await[0];
    stack.connections.send_to(&id, "hello").await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    let event: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(
        event,
        serde_json::json!({ "target": "Update", "arguments": ["hello"] })
    );

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_gateway_pings_backend() {
    let mut stack = start_stack(Duration::from_millis(100)).await;

    let url = format!("ws://{}/chat?username=bob", stack.gateway_addr);
    let (_ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), stack.received.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(message.text.starts_with("ping "), "got {:?}", message.text);
    assert!(message.text.ends_with('Z'));
}

#[tokio::test]
async fn test_browser_close_releases_backend() {
    let stack = start_stack(Duration::from_secs(30)).await;

    let url = format!("ws://{}/chat?username=carol", stack.gateway_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let connections = Arc::clone(&stack.connections);
    wait_until("backend connection", || {
        let connections = Arc::clone(&connections);
        async move { connections.len().await == 1 }
    })
    .await;

    ws.close(None).await.unwrap();

    wait_until("backend release", || {
        let connections = Arc::clone(&connections);
        async move { connections.is_empty().await }
    })
    .await;

    let sessions = Arc::clone(&stack.sessions);
    wait_until("gateway session removal", || {
        let sessions = Arc::clone(&sessions);
        async move { sessions.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_backend_close_closes_browser_connection() {
    let stack = start_stack(Duration::from_secs(30)).await;

    let url = format!("ws://{}/chat?username=dave", stack.gateway_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let connections = Arc::clone(&stack.connections);
    wait_until("backend connection", || {
        let connections = Arc::clone(&connections);
        async move { connections.len().await == 1 }
    })
    .await;
    assert_eq!(stack.sessions.len().await, 1);

    // The backend hangs up on the gateway
    let id = stack.connections.connection_ids().await[0];
    let session = stack.connections.remove(&id).await.unwrap();
    session.release().await;

    expect_close(&mut ws).await;

    let sessions = Arc::clone(&stack.sessions);
    wait_until("gateway session removal", || {
        let sessions = Arc::clone(&sessions);
        async move { sessions.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_unreachable_backend_closes_browser_connection() {
    init_tracing();

    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = dead.local_addr().unwrap();
    drop(dead);

    let policy = RetryPolicy {
        name: "e2e".to_string(),
        max_retries: 3,
        backoff: BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter: 0.0,
        },
    };
    let (gateway_addr, sessions) =
        start_gateway(backend_addr, RelaySettings::default(), policy).await;

    let url = format!("ws://{gateway_addr}/chat?username=erin");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    expect_close(&mut ws).await;

    wait_until("gateway session removal", || {
        let sessions = Arc::clone(&sessions);
        async move { sessions.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_missing_username_is_rejected() {
    let stack = start_stack(Duration::from_secs(30)).await;

    let url = format!("ws://{}/chat", stack.gateway_addr);
    match tokio_tungstenite::connect_async(&url).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 400);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connection without username should be rejected"),
    }
    assert!(stack.connections.is_empty().await);
}
