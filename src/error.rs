//! Gateway error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::events::TransformError;
use crate::invocation::{HandlerError, InvocationError, LoaderError};
use crate::net::ListenerError;
use crate::routing::RouteError;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    HandlerUnresolvable(#[from] LoaderError),

    #[error("handler for {function} failed: {source}")]
    HandlerInvocation {
        function: String,
        #[source]
        source: HandlerError,
    },

    #[error("invalid handler result: {0}")]
    Transform(#[from] TransformError),

    #[error("invalid route: {0}")]
    Route(#[from] RouteError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InvocationError> for GatewayError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Unresolvable(e) => GatewayError::HandlerUnresolvable(e),
            InvocationError::Failed { function, source } => {
                GatewayError::HandlerInvocation { function, source }
            }
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a JSON envelope. Server errors carry a generic message;
    /// the underlying detail is added only in development mode.
    pub fn into_http_response(self, development: bool) -> Response {
        let status = self.status();
        let message = match &self {
            GatewayError::RouteNotFound { .. } => self.to_string(),
            GatewayError::BodyTooLarge { .. } => "Request body too large".to_string(),
            GatewayError::BodyRead(_) => "Invalid request body".to_string(),
            _ => "Internal Server Error".to_string(),
        };

        let body = if development && status.is_server_error() {
            json!({ "message": message, "error": self.to_string() })
        } else {
            json!({ "message": message })
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_http_response(false)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
