//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (timeouts, memory, body cap)
//! - Check every HTTP path compiles as a route template
//! - Detect duplicate function names and WebSocket route keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: &GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashMap;

use crate::config::schema::{EventConfig, GatewayConfig};
use crate::routing::{RouteMethod, RouteTemplate};

/// A single semantic problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gateway.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "gateway.max_body_bytes",
            "must be greater than zero",
        ));
    }
    if config.gateway.host.trim().is_empty() {
        errors.push(ValidationError::new("gateway.host", "must not be empty"));
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut route_keys: HashMap<&str, &str> = HashMap::new();

    for (i, function) in config.functions.iter().enumerate() {
        let field = |suffix: &str| format!("functions[{}].{}", i, suffix);

        if function.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if let Some(first) = names.insert(function.name.as_str(), i) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate function name '{}' (also functions[{}])", function.name, first),
            ));
        }
        if function.handler.trim().is_empty() {
            errors.push(ValidationError::new(field("handler"), "must not be empty"));
        }
        if function.timeout_secs == 0 {
            errors.push(ValidationError::new(field("timeout_secs"), "must be greater than zero"));
        }
        if function.memory_mb == 0 {
            errors.push(ValidationError::new(field("memory_mb"), "must be greater than zero"));
        }

        for (j, event) in function.events.iter().enumerate() {
            let event_field = |suffix: &str| format!("functions[{}].events[{}].{}", i, j, suffix);
            match event {
                EventConfig::Http(http) => {
                    if let Err(e) = RouteTemplate::compile(&http.path) {
                        errors.push(ValidationError::new(event_field("http.path"), e.to_string()));
                    }
                    if let Err(e) = RouteMethod::parse(&http.method) {
                        errors.push(ValidationError::new(event_field("http.method"), e.to_string()));
                    }
                }
                EventConfig::WebSocket(ws) => {
                    if ws.route_key.trim().is_empty() {
                        errors.push(ValidationError::new(
                            event_field("websocket.route_key"),
                            "must not be empty",
                        ));
                    } else if let Some(owner) =
                        route_keys.insert(ws.route_key.as_str(), function.name.as_str())
                    {
                        errors.push(ValidationError::new(
                            event_field("websocket.route_key"),
                            format!("route key '{}' already bound to '{}'", ws.route_key, owner),
                        ));
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
