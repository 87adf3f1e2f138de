//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (bind host:port, classify bind failures)
//!     → Hand off to the HTTP server
//!
//! WebSocket upgrade accepted
//!     → connection.rs (register, CONNECTING)
//!     → CONNECT route accepted → OPEN
//!     → transport close / admin disconnect / shutdown → CLOSED (purged)
//! ```
//!
//! # Design Decisions
//! - One listener serves HTTP and WebSocket traffic
//! - Registry is in-memory and process-local

pub mod connection;
pub mod listener;

pub use connection::{
    ConnectionInfo, ConnectionRecord, ConnectionRegistry, ConnectionState, ConnectionSummary,
    OutboundFrame,
};
pub use listener::{bind, ListenerError};
