//! CORS preflight middleware.
//! Answers `OPTIONS` preflights for CORS-enabled paths before routing.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::http::response::preflight_response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::RouteMethod;

pub async fn cors_preflight(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let inner = &state.inner;
    let path = request.uri().path();

    // An explicit OPTIONS route handles its own preflights.
    let explicit = inner
        .routes
        .match_route(path, &Method::OPTIONS)
        .is_some_and(|m| matches!(m.route.method, RouteMethod::Exact(_)));

    if !explicit && (inner.settings.cors || inner.routes.allows_preflight(path)) {
        tracing::debug!(path = %path, "CORS preflight answered");
        let response = preflight_response(request.headers());
        metrics::record_http_request("OPTIONS", response.status().as_u16());
        return response;
    }

    next.run(request).await
}
