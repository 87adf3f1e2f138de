//! WebSocket lifecycle events.
//!
//! # Responsibilities
//! - Capture the upgrade request once, at accept time
//! - Build CONNECT / MESSAGE / DISCONNECT events for a connection
//! - Select a route key from an inbound frame
//! - Read the status-code convention out of handler results
//!
//! # Design Decisions
//! - Route selection never fails: anything that is not a JSON object with a
//!   string `action` falls back to `$default`
//! - Headers and query parameters are only attached to CONNECT events

use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::header;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::http::{header_maps, query_maps, user_agent, MultiValueMap, SingleValueMap};
use crate::events::ids::generate_request_id;
use crate::events::{request_time, RequestIdentity, API_ID};

pub const CONNECT_ROUTE: &str = "$connect";
pub const DISCONNECT_ROUTE: &str = "$disconnect";
pub const DEFAULT_ROUTE: &str = "$default";

/// The three lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebSocketEventKind {
    Connect,
    Message,
    Disconnect,
}

/// The upgrade request as seen at accept time.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub path: String,
    pub host: Option<String>,
    pub headers: SingleValueMap,
    pub multi_value_headers: MultiValueMap,
    pub query: Option<SingleValueMap>,
    pub multi_value_query: Option<MultiValueMap>,
    pub identity: RequestIdentity,
}

impl UpgradeRequest {
    pub fn from_parts(parts: &Parts, source_ip: &str) -> Self {
        let (headers, multi_value_headers) = header_maps(&parts.headers);
        let (query, multi_value_query) = query_maps(parts.uri.query());
        Self {
            path: parts.uri.path().to_string(),
            host: parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            headers,
            multi_value_headers,
            query,
            multi_value_query,
            identity: RequestIdentity {
                source_ip: source_ip.to_string(),
                user_agent: user_agent(&parts.headers),
            },
        }
    }
}

/// Identity of a live connection, shared by every event it produces.
#[derive(Debug, Clone)]
pub struct ConnectionDetails {
    pub connection_id: String,
    pub connected_at_ms: i64,
    pub upgrade: Arc<UpgradeRequest>,
}

/// A whole inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl FramePayload {
    /// Binary frames holding valid UTF-8 are treated as text.
    pub fn from_binary(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => FramePayload::Text(text),
            Err(err) => FramePayload::Binary(err.into_bytes()),
        }
    }

    /// The route key named by the frame's `action` field, or `$default`.
    pub fn route_key(&self) -> String {
        let FramePayload::Text(text) = self else {
            return DEFAULT_ROUTE.to_string();
        };
        serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|value| value.get("action")?.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ROUTE.to_string())
    }

    /// Event body and its base64 flag.
    fn into_body(self) -> (String, bool) {
        match self {
            FramePayload::Text(text) => (text, false),
            FramePayload::Binary(bytes) => (STANDARD.encode(bytes), true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketRequestContext {
    pub route_key: String,
    pub event_type: WebSocketEventKind,
    pub message_direction: String,
    pub message_id: Option<String>,
    pub connection_id: String,
    pub connected_at: i64,
    pub domain_name: String,
    pub stage: String,
    pub api_id: String,
    pub request_id: String,
    pub extended_request_id: String,
    pub request_time: String,
    pub request_time_epoch: i64,
    pub identity: RequestIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect_reason: Option<String>,
}

/// The event a handler receives for a WebSocket lifecycle step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketInvocationEvent {
    pub request_context: WebSocketRequestContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<SingleValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_value_headers: Option<MultiValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<SingleValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_value_query_string_parameters: Option<MultiValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

impl WebSocketInvocationEvent {
    fn base(
        details: &ConnectionDetails,
        kind: WebSocketEventKind,
        route_key: &str,
        stage: &str,
    ) -> Self {
        let now = chrono::Utc::now();
        let request_id = generate_request_id();
        Self {
            request_context: WebSocketRequestContext {
                route_key: route_key.to_string(),
                event_type: kind,
                message_direction: "IN".to_string(),
                message_id: None,
                connection_id: details.connection_id.clone(),
                connected_at: details.connected_at_ms,
                domain_name: details
                    .upgrade
                    .host
                    .clone()
                    .unwrap_or_else(|| "localhost".to_string()),
                stage: stage.to_string(),
                api_id: API_ID.to_string(),
                extended_request_id: request_id.clone(),
                request_id,
                request_time: request_time(now),
                request_time_epoch: now.timestamp_millis(),
                identity: details.upgrade.identity.clone(),
                disconnect_status_code: None,
                disconnect_reason: None,
            },
            headers: None,
            multi_value_headers: None,
            query_string_parameters: None,
            multi_value_query_string_parameters: None,
            body: None,
            is_base64_encoded: false,
        }
    }

    /// CONNECT event, carrying the upgrade request's headers and query.
    pub fn connect(details: &ConnectionDetails, stage: &str) -> Self {
        let mut event = Self::base(details, WebSocketEventKind::Connect, CONNECT_ROUTE, stage);
        let upgrade = &details.upgrade;
        event.headers = Some(upgrade.headers.clone()).filter(|h| !h.is_empty());
        event.multi_value_headers =
            Some(upgrade.multi_value_headers.clone()).filter(|h| !h.is_empty());
        event.query_string_parameters = upgrade.query.clone();
        event.multi_value_query_string_parameters = upgrade.multi_value_query.clone();
        event
    }

    /// MESSAGE event for one inbound frame.
    pub fn message(
        details: &ConnectionDetails,
        route_key: &str,
        payload: FramePayload,
        stage: &str,
    ) -> Self {
        let mut event = Self::base(details, WebSocketEventKind::Message, route_key, stage);
        let (body, is_base64_encoded) = payload.into_body();
        event.request_context.message_id = Some(generate_request_id());
        event.body = Some(body);
        event.is_base64_encoded = is_base64_encoded;
        event
    }

    /// DISCONNECT event, with the close code and reason when the peer sent them.
    pub fn disconnect(
        details: &ConnectionDetails,
        status_code: Option<u16>,
        reason: Option<String>,
        stage: &str,
    ) -> Self {
        let mut event = Self::base(
            details,
            WebSocketEventKind::Disconnect,
            DISCONNECT_ROUTE,
            stage,
        );
        event.request_context.disconnect_status_code = status_code;
        event.request_context.disconnect_reason = reason;
        event
    }
}

/// The explicit status code of a handler result, if any.
///
/// No result, a non-object result, or an object without `statusCode` all
/// count as success and yield `None`.
pub fn result_status_code(result: Option<&Value>) -> Option<u16> {
    match result?.get("statusCode")? {
        Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The body a route response sends back to the caller.
pub fn result_body(result: Option<&Value>) -> Option<String> {
    match result?.get("body")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
