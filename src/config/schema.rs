//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and request-handling settings.
    pub gateway: GatewaySettings,

    /// Environment shared by every function.
    pub environment: HashMap<String, String>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Function definitions and their event bindings.
    pub functions: Vec<FunctionConfig>,
}

/// Gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Bind host.
    pub host: String,

    /// Bind port (0 picks an ephemeral port).
    pub port: u16,

    /// Answer preflights and add CORS headers on every route.
    pub cors: bool,

    /// Include error detail in 500 response bodies.
    pub development: bool,

    /// Request body cap in bytes.
    pub max_body_bytes: usize,

    /// Reported as `requestContext.stage`.
    pub stage: String,

    /// Base directory for executable handlers.
    pub handlers_dir: String,

    /// Mirror each invocation's environment into the process environment.
    pub apply_process_environment: bool,

    /// Send MESSAGE route result bodies back to the calling connection.
    pub websocket_route_responses: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors: false,
            development: false,
            max_body_bytes: 10 * 1024 * 1024,
            stage: "local".to_string(),
            handlers_dir: ".".to_string(),
            apply_process_environment: true,
            websocket_route_responses: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// One function and the events bound to it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionConfig {
    /// Unique function name.
    pub name: String,

    /// Handler specifier ("location.export").
    pub handler: String,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Function environment; overrides the global map.
    #[serde(default)]
    pub environment: HashMap<String, String>,

    #[serde(default)]
    pub events: Vec<EventConfig>,
}

fn default_memory_mb() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    6
}

impl FunctionConfig {
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            memory_mb: default_memory_mb(),
            timeout_secs: default_timeout_secs(),
            environment: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn http(mut self, method: &str, path: &str) -> Self {
        self.events.push(EventConfig::Http(HttpEventConfig {
            method: method.to_string(),
            path: path.to_string(),
            cors: false,
        }));
        self
    }

    pub fn http_cors(mut self, method: &str, path: &str) -> Self {
        self.events.push(EventConfig::Http(HttpEventConfig {
            method: method.to_string(),
            path: path.to_string(),
            cors: true,
        }));
        self
    }

    pub fn websocket(mut self, route_key: &str) -> Self {
        self.events.push(EventConfig::WebSocket(WebSocketEventConfig {
            route_key: route_key.to_string(),
        }));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }
}

/// An event binding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventConfig {
    Http(HttpEventConfig),
    WebSocket(WebSocketEventConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpEventConfig {
    /// Method or `ANY`.
    pub method: String,

    /// Route template.
    pub path: String,

    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketEventConfig {
    pub route_key: String,
}
