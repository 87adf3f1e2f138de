//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (method filter, anchored template match)
//!     → Return: matched Route + decoded path parameters, or no match
//!
//! Route Compilation (at startup):
//!     functions[].events[].http
//!     → matcher.rs compiles each template into an anchored regex
//!     → router.rs appends in configuration order
//!     → Frozen inside the gateway state
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - First match wins, in registration order
//! - `{name}` captures one segment, `{name+}` captures the remainder

pub mod matcher;
pub mod router;

pub use matcher::{RouteError, RouteMethod, RouteTemplate};
pub use router::{EventMetadata, Route, RouteMatch, RouteOwner, RouteTable};
