//! Invocation event transformation.
//!
//! # Data Flow
//! ```text
//! HTTP request parts + buffered body + route match
//!     → http.rs → HttpInvocationEvent
//!
//! Upgrade request + frame payload + connection details
//!     → websocket.rs → WebSocketInvocationEvent
//!
//! Handler result (JSON value)
//!     → http.rs → axum Response
//!     → websocket.rs → status code convention
//! ```
//!
//! # Design Decisions
//! - Events are built fresh per invocation and never mutated afterwards
//! - Field names follow the emulated platform's camelCase wire format
//! - Request and message ids are random, never sequential

pub mod http;
pub mod ids;
pub mod websocket;

use serde::{Deserialize, Serialize};

pub use self::http::{HttpHandlerResult, HttpInvocationEvent, HttpRequestContext, TransformError};
pub use self::websocket::{
    ConnectionDetails, FramePayload, UpgradeRequest, WebSocketEventKind, WebSocketInvocationEvent,
};

/// Fixed account id reported in every request context.
pub const ACCOUNT_ID: &str = "123456789012";

/// Fixed API id reported in every request context.
pub const API_ID: &str = "localapi01";

/// Caller identity as seen by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    pub source_ip: String,
    pub user_agent: Option<String>,
}

/// The event passed to a handler.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InvocationEvent {
    Http(HttpInvocationEvent),
    WebSocket(WebSocketInvocationEvent),
}

impl InvocationEvent {
    /// The gateway request id carried in the request context.
    pub fn request_id(&self) -> &str {
        match self {
            InvocationEvent::Http(event) => &event.request_context.request_id,
            InvocationEvent::WebSocket(event) => &event.request_context.request_id,
        }
    }

    pub fn as_http(&self) -> Option<&HttpInvocationEvent> {
        match self {
            InvocationEvent::Http(event) => Some(event),
            InvocationEvent::WebSocket(_) => None,
        }
    }

    pub fn as_websocket(&self) -> Option<&WebSocketInvocationEvent> {
        match self {
            InvocationEvent::WebSocket(event) => Some(event),
            InvocationEvent::Http(_) => None,
        }
    }
}

/// Format a timestamp the way request contexts report `requestTime`.
pub(crate) fn request_time(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%d/%b/%Y:%H:%M:%S %z").to_string()
}
