//! Connection management API.
//!
//! Mirrors the hosted platform's `@connections` API so backends can push to
//! clients with the same calls they would make in the cloud:
//!
//! ```text
//! GET    /@connections        → [{connectionId, connectedAt}]
//! POST   /@connections/{id}   → 200 | 410 Gone   (raw body sent as one frame)
//! GET    /@connections/{id}   → 200 metadata | 410 Gone
//! DELETE /@connections/{id}   → 204 | 410 Gone   (idempotent)
//! ```

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;
use crate::http::server::AppState;

/// Path prefix of the management API.
pub const CONNECTIONS_PATH: &str = "/@connections";

pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route(CONNECTIONS_PATH, get(list_connections))
        .route(
            "/@connections/{connection_id}",
            get(get_connection)
                .post(post_to_connection)
                .delete(delete_connection),
        )
}
