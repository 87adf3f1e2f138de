//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lambda_dev_gateway::config::{FunctionConfig, GatewayConfig};
use lambda_dev_gateway::events::InvocationEvent;
use lambda_dev_gateway::invocation::{
    ExecutionContext, Handler, HandlerError, HandlerLoader, HandlerSpecifier, LoaderError,
};
use lambda_dev_gateway::net::ConnectionState;
use lambda_dev_gateway::{handler_fn, GatewayServer, RunningGateway, StaticHandlerLoader};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// A config listening on an ephemeral loopback port.
pub fn config(functions: Vec<FunctionConfig>) -> GatewayConfig {
    let mut config = GatewayConfig {
        functions,
        ..GatewayConfig::default()
    };
    config.gateway.host = "127.0.0.1".to_string();
    config.gateway.port = 0;
    config
}

/// Start a gateway serving in the background.
pub async fn start_gateway(config: GatewayConfig, loader: Arc<dyn HandlerLoader>) -> RunningGateway {
    GatewayServer::new(config, loader)
        .unwrap()
        .start()
        .await
        .unwrap()
}

pub fn http_url(gateway: &RunningGateway, path: &str) -> String {
    format!("http://{}{}", gateway.local_addr(), path)
}

pub async fn ws_connect(gateway: &RunningGateway, path: &str) -> WsClient {
    let url = format!("ws://{}{}", gateway.local_addr(), path);
    let (client, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

/// Next frame other than ping/pong, or `None` when the stream ends.
pub async fn next_message(client: &mut WsClient) -> Option<Message> {
    loop {
        match tokio::time::timeout(WAIT, client.next()).await {
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(message))) => return Some(message),
            Ok(Some(Err(_))) | Ok(None) => return None,
            Err(_) => panic!("timed out waiting for a WebSocket frame"),
        }
    }
}

pub async fn next_text(client: &mut WsClient) -> String {
    match next_message(client).await {
        Some(Message::Text(text)) => text.to_string(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// The close code and reason the server sent.
pub async fn expect_close(client: &mut WsClient) -> (u16, String) {
    match next_message(client).await {
        Some(Message::Close(Some(frame))) => (u16::from(frame.code), frame.reason.to_string()),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

/// Poll until `check` passes or the wait budget runs out.
pub async fn wait_until<F: Fn() -> bool>(check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until `count` connections are tracked and all of them are open.
pub async fn wait_for_open(gateway: &RunningGateway, count: usize) -> Vec<String> {
    let registry = gateway.connections().clone();
    wait_until(|| {
        let listed = registry.list();
        listed.len() == count
            && listed
                .iter()
                .all(|c| registry.state(&c.connection_id) == Some(ConnectionState::Open))
    })
    .await;
    registry
        .list()
        .into_iter()
        .map(|c| c.connection_id)
        .collect()
}

async fn explode(
    _event: InvocationEvent,
    _ctx: ExecutionContext,
) -> Result<Option<Value>, HandlerError> {
    panic!("handler blew up")
}

/// A handler that panics on every invocation.
pub fn panicking_handler() -> Arc<dyn Handler> {
    handler_fn(explode)
}

/// Loader that counts resolutions before delegating.
#[derive(Clone, Default)]
pub struct CountingLoader {
    pub inner: StaticHandlerLoader,
    resolves: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(inner: StaticHandlerLoader) -> Self {
        Self {
            inner,
            resolves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandlerLoader for CountingLoader {
    async fn resolve(&self, specifier: &HandlerSpecifier) -> Result<Arc<dyn Handler>, LoaderError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(specifier).await
    }
}
