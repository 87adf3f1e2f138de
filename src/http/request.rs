//! Request handling.
//!
//! # Responsibilities
//! - Buffer request bodies up to the configured cap
//! - Extract the caller's source IP
//!
//! # Design Decisions
//! - A declared `content-length` over the cap is rejected before reading
//! - Streaming bodies are read through a length limit and rejected once
//!   they exceed the cap, so oversized requests never reach a handler

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Extensions};
use http_body_util::LengthLimitError;

use crate::error::GatewayError;

/// Reported when the connection address is unavailable (in-process tests).
pub const FALLBACK_SOURCE_IP: &str = "127.0.0.1";

/// Read the whole body, failing once it exceeds `limit` bytes.
pub async fn read_body(body: Body, headers: &HeaderMap, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(GatewayError::BodyTooLarge { limit });
    }

    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            GatewayError::BodyTooLarge { limit }
        } else {
            GatewayError::BodyRead(inner.to_string())
        }
    })
}

/// The peer address recorded by the server, or the loopback fallback.
pub fn source_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| FALLBACK_SOURCE_IP.to_string())
}
