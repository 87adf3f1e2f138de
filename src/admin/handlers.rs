use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::server::AppState;
use crate::net::connection::CLOSE_NORMAL;
use crate::net::{ConnectionSummary, OutboundFrame};

fn gone() -> Response {
    (StatusCode::GONE, Json(json!({ "message": "Gone" }))).into_response()
}

pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionSummary>> {
    Json(state.inner.connections.list())
}

pub async fn post_to_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    body: Bytes,
) -> Response {
    if state
        .inner
        .connections
        .send_to_one(&connection_id, OutboundFrame::from_bytes(body.to_vec()))
    {
        tracing::debug!(connection_id = %connection_id, bytes = body.len(), "Posted to connection");
        StatusCode::OK.into_response()
    } else {
        gone()
    }
}

pub async fn get_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Response {
    match state.inner.connections.info(&connection_id) {
        Some(info) => Json(info).into_response(),
        None => gone(),
    }
}

pub async fn delete_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Response {
    if state
        .inner
        .connections
        .disconnect(&connection_id, CLOSE_NORMAL, "")
    {
        StatusCode::NO_CONTENT.into_response()
    } else {
        gone()
    }
}
