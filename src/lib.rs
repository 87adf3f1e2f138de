//! Local development gateway for event-driven function handlers.
//!
//! Emulates an HTTP API gateway, a WebSocket API gateway and the function
//! invocation contract on a single local listener, so handlers can be
//! exercised without deploying them.

pub mod admin;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod invocation;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{GatewayServer, RunningGateway};
pub use invocation::loader::{handler_fn, Handler, HandlerLoader, HandlerSpecifier, StaticHandlerLoader};
pub use lifecycle::Shutdown;
