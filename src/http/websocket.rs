//! WebSocket connection handling.
//!
//! # Responsibilities
//! - Complete the upgrade handshake on any path
//! - Register the connection and dispatch CONNECT
//! - Dispatch one MESSAGE invocation per inbound frame, in arrival order
//! - Dispatch DISCONNECT and purge the record on close
//!
//! # Data Flow
//! ```text
//! Client ──frames──→ reader loop ──→ route key → invocation (sequential)
//! Client ←─frames─── writer task ←── mpsc ←── registry (admin API, broadcast,
//!                                              route responses, shutdown)
//! ```
//!
//! # Design Decisions
//! - The record stays CONNECTING until the CONNECT route returns
//! - A CONNECT rejection (status >= 400) closes with 1008 and no DISCONNECT
//! - A CONNECT failure closes with 1011
//! - Closing does not cancel handlers already running for the connection

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        FromRequestParts,
    },
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::events::websocket::{
    result_body, result_status_code, CONNECT_ROUTE, DISCONNECT_ROUTE,
};
use crate::events::{
    ConnectionDetails, FramePayload, InvocationEvent, UpgradeRequest, WebSocketInvocationEvent,
};
use crate::http::request::source_ip;
use crate::http::server::AppState;
use crate::net::connection::{CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION};
use crate::net::OutboundFrame;
use crate::observability::metrics;

enum ConnectOutcome {
    Accepted,
    Rejected(u16),
    Failed,
}

/// Upgrade the request and hand the socket to the connection loop.
pub async fn handle_upgrade(state: AppState, request: Request<Body>) -> Response {
    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "WebSocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let request = Arc::new(UpgradeRequest::from_parts(&parts, &source_ip(&parts.extensions)));
    upgrade
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(state, socket, request))
}

async fn run_connection(state: AppState, socket: WebSocket, upgrade: Arc<UpgradeRequest>) {
    let inner = Arc::clone(&state.inner);
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let details = inner.connections.register(upgrade, tx);
    let connection_id = details.connection_id.clone();

    let mut writer = tokio::spawn({
        let connection_id = connection_id.clone();
        async move {
            while let Some(frame) = rx.recv().await {
                let (message, closing) = match frame {
                    OutboundFrame::Text(text) => (Message::Text(text.into()), false),
                    OutboundFrame::Binary(bytes) => (Message::Binary(bytes.into()), false),
                    OutboundFrame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Socket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        }
    });

    match dispatch_connect(&state, &details).await {
        ConnectOutcome::Accepted => {}
        ConnectOutcome::Rejected(status) => {
            tracing::info!(connection_id = %connection_id, status, "Connection rejected by CONNECT route");
            inner
                .connections
                .disconnect(&connection_id, CLOSE_POLICY_VIOLATION, "Forbidden");
            let _ = writer.await;
            return;
        }
        ConnectOutcome::Failed => {
            inner
                .connections
                .disconnect(&connection_id, CLOSE_INTERNAL_ERROR, "Internal server error");
            let _ = writer.await;
            return;
        }
    }

    if !inner.connections.mark_open(&connection_id) {
        // Closed (shutdown or management API) while CONNECT was running.
        let _ = writer.await;
        return;
    }
    tracing::info!(connection_id = %connection_id, "WebSocket connection open");

    let mut writer_done = false;
    let mut close_code = None;
    let mut close_reason = None;

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state, &details, FramePayload::Text(text.to_string())).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    handle_frame(&state, &details, FramePayload::from_binary(bytes.to_vec())).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_code = Some(frame.code);
                        close_reason = Some(frame.reason.to_string());
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                    break;
                }
                None => break,
            },
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    inner.connections.remove(&connection_id);
    if !writer_done {
        let _ = writer.await;
    }
    tracing::info!(connection_id = %connection_id, code = ?close_code, "WebSocket connection closed");

    dispatch_disconnect(&state, &details, close_code, close_reason).await;
}

async fn dispatch_connect(state: &AppState, details: &ConnectionDetails) -> ConnectOutcome {
    let inner = &state.inner;
    let Some(target) = inner.websocket_target(CONNECT_ROUTE) else {
        return ConnectOutcome::Accepted;
    };

    let event = WebSocketInvocationEvent::connect(details, &inner.settings.stage);
    match inner
        .invoker
        .invoke(target, InvocationEvent::WebSocket(event))
        .await
    {
        Ok(result) => match result_status_code(result.as_ref()) {
            Some(status) if status >= 400 => ConnectOutcome::Rejected(status),
            _ => ConnectOutcome::Accepted,
        },
        Err(e) => {
            tracing::warn!(
                connection_id = %details.connection_id,
                error = %e,
                "CONNECT route failed; closing connection"
            );
            ConnectOutcome::Failed
        }
    }
}

async fn handle_frame(state: &AppState, details: &ConnectionDetails, payload: FramePayload) {
    let inner = &state.inner;
    let route_key = payload.route_key();
    inner.connections.touch(&details.connection_id, &route_key);
    metrics::record_websocket_message(&route_key);

    let Some(target) = inner.websocket_target(&route_key) else {
        tracing::warn!(
            connection_id = %details.connection_id,
            route_key = %route_key,
            "No handler bound to route key; message ignored"
        );
        return;
    };

    let event =
        WebSocketInvocationEvent::message(details, &route_key, payload, &inner.settings.stage);
    match inner
        .invoker
        .invoke(target, InvocationEvent::WebSocket(event))
        .await
    {
        Ok(result) => {
            if let Some(status) = result_status_code(result.as_ref()).filter(|s| *s >= 400) {
                tracing::warn!(
                    connection_id = %details.connection_id,
                    route_key = %route_key,
                    status,
                    "Route handler returned an error status"
                );
            }
            if inner.settings.websocket_route_responses {
                if let Some(body) = result_body(result.as_ref()) {
                    inner.connections.send_to_one(&details.connection_id, body);
                }
            }
        }
        Err(e) => tracing::warn!(
            connection_id = %details.connection_id,
            route_key = %route_key,
            error = %e,
            "Route handler failed; message dropped"
        ),
    }
}

async fn dispatch_disconnect(
    state: &AppState,
    details: &ConnectionDetails,
    code: Option<u16>,
    reason: Option<String>,
) {
    let inner = &state.inner;
    let Some(target) = inner.websocket_target(DISCONNECT_ROUTE) else {
        tracing::debug!(connection_id = %details.connection_id, "No DISCONNECT route bound");
        return;
    };

    let event = WebSocketInvocationEvent::disconnect(details, code, reason, &inner.settings.stage);
    if let Err(e) = inner
        .invoker
        .invoke(target, InvocationEvent::WebSocket(event))
        .await
    {
        tracing::warn!(
            connection_id = %details.connection_id,
            error = %e,
            "DISCONNECT route failed"
        );
    }
}
