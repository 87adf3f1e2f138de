//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → RunningGateway::stop
//!
//! Shutdown (shutdown.rs):
//!     trigger → close every WebSocket (1001 "Server shutting down")
//!             → stop accepting → listener closed → stop() resolves
//! ```
//!
//! # Design Decisions
//! - Connections are closed before the listener
//! - Stop resolves only after the serving task has finished

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
