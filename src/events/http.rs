//! HTTP event construction and result conversion.
//!
//! # Responsibilities
//! - Build a REST-proxy style event from request parts and a buffered body
//! - Convert a handler's structured result back into a transport response
//!
//! # Design Decisions
//! - Header keys are lower-cased; the single-value map keeps the first value
//! - Inbound bodies are decoded as UTF-8 text, never base64
//! - Outbound bodies flagged base64 are decoded to raw bytes; other bodies are
//!   re-serialised when they parse as JSON and passed through otherwise

use std::collections::HashMap;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::ids::generate_request_id;
use crate::events::{request_time, RequestIdentity, ACCOUNT_ID, API_ID};
use crate::routing::RouteMatch;

pub type SingleValueMap = HashMap<String, String>;
pub type MultiValueMap = HashMap<String, Vec<String>>;

/// Errors converting a handler result into a response.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid status code in handler result: {0}")]
    InvalidStatus(String),

    #[error("body flagged as base64 could not be decoded: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("malformed handler result: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Request context of an HTTP event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestContext {
    pub account_id: String,
    pub api_id: String,
    pub resource_path: String,
    pub http_method: String,
    pub path: String,
    pub stage: String,
    pub protocol: String,
    pub request_id: String,
    pub request_time: String,
    pub request_time_epoch: i64,
    pub identity: RequestIdentity,
}

/// The event a handler receives for an HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpInvocationEvent {
    pub resource: String,
    pub path: String,
    pub http_method: String,
    pub headers: SingleValueMap,
    pub multi_value_headers: MultiValueMap,
    pub query_string_parameters: Option<SingleValueMap>,
    pub multi_value_query_string_parameters: Option<MultiValueMap>,
    pub path_parameters: Option<SingleValueMap>,
    pub stage_variables: Option<SingleValueMap>,
    pub request_context: HttpRequestContext,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

impl HttpInvocationEvent {
    /// Build the event for a matched request.
    pub fn from_request(
        parts: &Parts,
        body: &[u8],
        source_ip: &str,
        route_match: &RouteMatch<'_>,
        stage: &str,
    ) -> Self {
        let (headers, multi_value_headers) = header_maps(&parts.headers);
        let (query_string_parameters, multi_value_query_string_parameters) =
            query_maps(parts.uri.query());
        let path_parameters =
            (!route_match.params.is_empty()).then(|| route_match.params.clone());

        let now = chrono::Utc::now();
        let method = parts.method.to_string();
        let path = parts.uri.path().to_string();
        let resource = route_match.route.pattern().to_string();

        Self {
            resource: resource.clone(),
            path: path.clone(),
            http_method: method.clone(),
            headers,
            multi_value_headers,
            query_string_parameters,
            multi_value_query_string_parameters,
            path_parameters,
            stage_variables: None,
            request_context: HttpRequestContext {
                account_id: ACCOUNT_ID.to_string(),
                api_id: API_ID.to_string(),
                resource_path: resource,
                http_method: method,
                path,
                stage: stage.to_string(),
                protocol: format!("{:?}", parts.version),
                request_id: generate_request_id(),
                request_time: request_time(now),
                request_time_epoch: now.timestamp_millis(),
                identity: RequestIdentity {
                    source_ip: source_ip.to_string(),
                    user_agent: user_agent(&parts.headers),
                },
            },
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
            is_base64_encoded: false,
        }
    }
}

/// Split transport headers into single- and multi-value maps.
pub fn header_maps(headers: &HeaderMap) -> (SingleValueMap, MultiValueMap) {
    let mut single = SingleValueMap::new();
    let mut multi = MultiValueMap::new();

    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        let key = name.as_str().to_ascii_lowercase();
        if let Some(first) = values.first() {
            single.insert(key.clone(), first.clone());
        }
        multi.insert(key, values);
    }

    (single, multi)
}

/// Parse a raw query string into single- and multi-value maps.
/// Both are `None` when the query is absent or empty.
pub fn query_maps(query: Option<&str>) -> (Option<SingleValueMap>, Option<MultiValueMap>) {
    let mut single = SingleValueMap::new();
    let mut multi = MultiValueMap::new();

    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        single.entry(key.clone()).or_insert_with(|| value.clone());
        multi.entry(key).or_default().push(value);
    }

    if single.is_empty() {
        (None, None)
    } else {
        (Some(single), Some(multi))
    }
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// Form-style decoding: `+` is a space, then percent escapes.
fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.clone())
}

/// The structured result a handler returns for an HTTP event.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHandlerResult {
    pub status_code: Option<Value>,
    pub headers: Option<HashMap<String, Value>>,
    pub multi_value_headers: Option<HashMap<String, Vec<Value>>>,
    pub body: Option<Value>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

const RESULT_KEYS: [&str; 5] = [
    "statusCode",
    "headers",
    "multiValueHeaders",
    "body",
    "isBase64Encoded",
];

impl HttpHandlerResult {
    /// Interpret a raw handler result.
    ///
    /// Objects carrying any proxy-response key are read as such; any other
    /// value becomes a 200 response with that value serialised as the body.
    pub fn from_value(value: Option<Value>) -> Result<Self, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(map)) if RESULT_KEYS.iter().any(|k| map.contains_key(*k)) => {
                Ok(serde_json::from_value(Value::Object(map))?)
            }
            Some(other) => Ok(Self {
                body: Some(Value::String(other.to_string())),
                ..Self::default()
            }),
        }
    }

    /// The status code, defaulting to 200.
    pub fn status(&self) -> Result<StatusCode, TransformError> {
        let code = match &self.status_code {
            None | Some(Value::Null) => return Ok(StatusCode::OK),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        code.and_then(|c| u16::try_from(c).ok())
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| {
                TransformError::InvalidStatus(
                    self.status_code
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_default(),
                )
            })
    }

    /// Build the transport response.
    pub fn into_response(self) -> Result<Response, TransformError> {
        let status = self.status()?;
        let mut headers = HeaderMap::new();

        for (name, values) in self.multi_value_headers.iter().flatten() {
            for value in values {
                append_header(&mut headers, name, value);
            }
        }
        for (name, value) in self.headers.iter().flatten() {
            let already_set = HeaderName::from_bytes(name.as_bytes())
                .map(|n| headers.contains_key(n))
                .unwrap_or(false);
            if !already_set {
                append_header(&mut headers, name, value);
            }
        }

        let raw_body = match self.body {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        let body = if self.is_base64_encoded {
            STANDARD.decode(raw_body.trim())?
        } else {
            match serde_json::from_str::<Value>(&raw_body) {
                Ok(json) => {
                    if !headers.contains_key(header::CONTENT_TYPE) {
                        headers.insert(
                            header::CONTENT_TYPE,
                            HeaderValue::from_static("application/json"),
                        );
                    }
                    serde_json::to_vec(&json)?
                }
                Err(_) => raw_body.into_bytes(),
            }
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &Value) {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(&text),
    ) {
        (Ok(name), Ok(value)) => {
            headers.append(name, value);
        }
        _ => tracing::warn!(header = %name, "Dropping invalid header from handler result"),
    }
}
