//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (one listener)
//!     → server.rs (Axum setup, upgrade detection)
//!     → middleware/cors.rs (preflight short-circuit)
//!     → /health, /@connections/* (fixed endpoints)
//!     → fallback dispatch:
//!         upgrade  → websocket.rs (connection loop)
//!         request  → routing → request.rs (capped body)
//!                  → events (HTTP event) → invocation
//!                  → events (result → response) → response.rs (CORS)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use server::{AppState, GatewayServer, RunningGateway, SHUTDOWN_REASON};
