//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Build the route table and invocation targets from configuration
//! - Create the Axum router (health, management API, dispatch fallback)
//! - Wire up middleware (CORS preflight, tracing)
//! - Dispatch HTTP requests to handlers and WebSocket upgrades to the
//!   connection loop
//! - Serve on one listener and stop gracefully

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::{EventConfig, GatewayConfig, GatewaySettings};
use crate::error::GatewayError;
use crate::events::{HttpHandlerResult, HttpInvocationEvent, InvocationEvent};
use crate::http::middleware::cors_preflight;
use crate::http::request::{read_body, source_ip};
use crate::http::response::apply_cors_headers;
use crate::http::websocket;
use crate::invocation::{HandlerLoader, HandlerSpecifier, InvocationTarget, Invoker};
use crate::lifecycle::Shutdown;
use crate::net::connection::CLOSE_GOING_AWAY;
use crate::net::{self, ConnectionRegistry, ListenerError};
use crate::observability::metrics;
use crate::routing::{EventMetadata, RouteOwner, RouteTable};

/// Close reason sent to every connection when the gateway stops.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// Shared, immutable gateway state.
pub struct GatewayInner {
    pub settings: GatewaySettings,
    pub routes: RouteTable,
    /// Route key → function name.
    pub websocket_routes: HashMap<String, String>,
    /// Function name → invocation target.
    pub functions: HashMap<String, InvocationTarget>,
    pub invoker: Invoker,
    pub connections: Arc<ConnectionRegistry>,
}

impl GatewayInner {
    /// The function bound to a WebSocket route key.
    pub fn websocket_target(&self, route_key: &str) -> Option<&InvocationTarget> {
        self.websocket_routes
            .get(route_key)
            .and_then(|name| self.functions.get(name))
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<GatewayInner>,
}

/// The unified HTTP + WebSocket gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Compile routes and targets from `config`; handlers are resolved
    /// through `loader` at invocation time.
    pub fn new(config: GatewayConfig, loader: Arc<dyn HandlerLoader>) -> Result<Self, GatewayError> {
        let mut routes = RouteTable::new();
        let mut websocket_routes = HashMap::new();
        let mut functions = HashMap::new();

        for function in &config.functions {
            let handler = HandlerSpecifier::parse(&function.handler);

            for event in &function.events {
                match event {
                    EventConfig::Http(http) => routes.register_route(
                        &http.path,
                        &http.method,
                        RouteOwner {
                            function_id: function.name.clone(),
                            handler: handler.clone(),
                            metadata: EventMetadata { cors: http.cors },
                        },
                    )?,
                    EventConfig::WebSocket(ws) => {
                        if let Some(previous) =
                            websocket_routes.insert(ws.route_key.clone(), function.name.clone())
                        {
                            tracing::warn!(
                                route_key = %ws.route_key,
                                previous = %previous,
                                function = %function.name,
                                "WebSocket route key rebound"
                            );
                        }
                    }
                }
            }

            functions.insert(
                function.name.clone(),
                InvocationTarget::new(
                    function.name.clone(),
                    handler,
                    function.memory_mb,
                    function.timeout_secs,
                    &config.environment,
                    &function.environment,
                ),
            );
        }

        tracing::info!(
            http_routes = routes.len(),
            websocket_routes = websocket_routes.len(),
            functions = functions.len(),
            "Gateway configured"
        );

        let state = AppState {
            inner: Arc::new(GatewayInner {
                invoker: Invoker::new(loader, config.gateway.apply_process_environment),
                settings: config.gateway,
                routes,
                websocket_routes,
                functions,
                connections: Arc::new(ConnectionRegistry::new()),
            }),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .merge(setup_admin_router())
            .fallback(dispatch)
            .layer(middleware::from_fn_with_state(state.clone(), cors_preflight))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// The router, for in-process use (e.g. `tower::ServiceExt::oneshot`).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.state.inner.connections)
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.state.inner.settings
    }

    /// Serve on `listener` until `shutdown_rx` fires.
    ///
    /// On shutdown every tracked connection is closed with
    /// [`SHUTDOWN_REASON`] before the listener stops; returns once the
    /// listener has closed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening (HTTP + WebSocket)");

        let connections = self.connections();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                let closed = connections.close_all(CLOSE_GOING_AWAY, SHUTDOWN_REASON);
                tracing::info!(closed, "Shutting down; WebSocket connections closed");
            })
            .await?;

        tracing::info!(address = %addr, "Gateway stopped");
        Ok(())
    }

    /// Bind the configured address and serve in the background.
    pub async fn start(self) -> Result<RunningGateway, GatewayError> {
        let listener = net::bind(&self.settings().host, self.settings().port).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Listener(ListenerError::Bind(e)))?;

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();
        let connections = self.connections();
        let task = tokio::spawn(self.run(listener, shutdown_rx));

        Ok(RunningGateway {
            local_addr,
            connections,
            shutdown,
            task,
        })
    }
}

/// Handle to a gateway serving in the background.
pub struct RunningGateway {
    local_addr: SocketAddr,
    connections: Arc<ConnectionRegistry>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Close every connection, then the listener; resolves once the
    /// listener has fully closed.
    pub async fn stop(self) -> Result<(), GatewayError> {
        self.shutdown.trigger();
        self.task
            .await
            .map_err(|e| GatewayError::Internal(format!("server task failed: {}", e)))?
            .map_err(|e| GatewayError::Internal(format!("server error: {}", e)))
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.inner.connections.len(),
    }))
}

/// Fallback handler: WebSocket upgrades on any path, everything else is
/// matched against the route table.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    if is_websocket_upgrade(request.headers()) {
        return websocket::handle_upgrade(state, request).await;
    }

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = match handle_http(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(method = %method, path = %path, error = %e, "Request failed");
            } else {
                tracing::debug!(method = %method, path = %path, error = %e, "Request rejected");
            }
            e.into_http_response(state.inner.settings.development)
        }
    };

    metrics::record_http_request(&method, response.status().as_u16());
    response
}

async fn handle_http(state: &AppState, request: Request<Body>) -> Result<Response, GatewayError> {
    let inner = &state.inner;
    let path = request.uri().path().to_string();

    let route_match = inner
        .routes
        .match_route(&path, request.method())
        .ok_or_else(|| GatewayError::RouteNotFound {
            method: request.method().to_string(),
            path: path.clone(),
        })?;

    let (parts, body) = request.into_parts();
    let body = read_body(body, &parts.headers, inner.settings.max_body_bytes).await?;

    let owner = &route_match.route.owner;
    let target = inner.functions.get(&owner.function_id).ok_or_else(|| {
        GatewayError::Internal(format!("no target for function {}", owner.function_id))
    })?;
    let cors = inner.settings.cors || owner.metadata.cors;

    let event = HttpInvocationEvent::from_request(
        &parts,
        &body,
        &source_ip(&parts.extensions),
        &route_match,
        &inner.settings.stage,
    );
    tracing::debug!(
        function = %owner.function_id,
        request_id = %event.request_context.request_id,
        resource = %event.resource,
        "Dispatching HTTP event"
    );

    let result = inner.invoker.invoke(target, InvocationEvent::Http(event)).await?;
    let mut response = HttpHandlerResult::from_value(result)?.into_response()?;
    if cors {
        apply_cors_headers(response.headers_mut());
    }
    Ok(response)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
