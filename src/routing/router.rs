//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the first route matching a (method, path) pair
//! - Answer CORS preflight eligibility for a path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) linear scan; the first registered match wins, there is no
//!   specificity ranking, so specific templates must be registered first
//! - Explicit `None` rather than a silent default route

use std::collections::HashMap;

use axum::http::Method;

use crate::invocation::loader::HandlerSpecifier;
use crate::routing::matcher::{RouteError, RouteMethod, RouteTemplate};

/// Per-event settings carried by an HTTP binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    /// Answer preflight requests and decorate responses with CORS headers.
    pub cors: bool,
}

/// The function a route dispatches to.
#[derive(Debug, Clone)]
pub struct RouteOwner {
    pub function_id: String,
    pub handler: HandlerSpecifier,
    pub metadata: EventMetadata,
}

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: RouteMethod,
    pub template: RouteTemplate,
    pub owner: RouteOwner,
}

impl Route {
    /// The template as configured (the event's `resource`).
    pub fn pattern(&self) -> &str {
        self.template.raw()
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a route.
    pub fn register_route(
        &mut self,
        pattern: &str,
        method: &str,
        owner: RouteOwner,
    ) -> Result<(), RouteError> {
        let template = RouteTemplate::compile(pattern)?;
        let method = RouteMethod::parse(method)?;

        tracing::debug!(
            method = %method,
            pattern = %pattern,
            function = %owner.function_id,
            "Route registered"
        );

        self.routes.push(Route {
            method,
            template,
            owner,
        });
        Ok(())
    }

    /// Find the first route, in registration order, accepting this request.
    pub fn match_route(&self, path: &str, method: &Method) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method.matches(method))
            .find_map(|route| {
                route
                    .template
                    .captures(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// Returns true if any CORS-enabled route serves this path, whatever its method.
    pub fn allows_preflight(&self, path: &str) -> bool {
        self.routes
            .iter()
            .any(|route| route.owner.metadata.cors && route.template.is_match(path))
    }

    /// Registered routes in order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
