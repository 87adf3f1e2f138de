//! Handler resolution contract.
//!
//! # Responsibilities
//! - Parse handler specifiers ("location.export")
//! - Define the `Handler` and `HandlerLoader` seams the gateway invokes through
//! - Provide an in-process loader for embedding and tests
//!
//! # Design Decisions
//! - The gateway never knows how a loader finds, builds or caches handlers
//! - "Not found" is distinct from "found but failed to load"

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::events::InvocationEvent;
use crate::invocation::context::ExecutionContext;

const DEFAULT_EXPORT: &str = "handler";

/// Location plus exported name of a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerSpecifier {
    pub location: String,
    pub export: String,
}

impl HandlerSpecifier {
    /// Split on the last `.` of the final path segment.
    ///
    /// `handlers/users.get` → (`handlers/users`, `get`); a specifier without
    /// a dot in its final segment exports `handler`.
    pub fn parse(raw: &str) -> Self {
        let segment_start = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
        match raw[segment_start..].rfind('.') {
            Some(dot) if dot > 0 => {
                let split = segment_start + dot;
                Self {
                    location: raw[..split].to_string(),
                    export: raw[split + 1..].to_string(),
                }
            }
            _ => Self {
                location: raw.to_string(),
                export: DEFAULT_EXPORT.to_string(),
            },
        }
    }
}

impl From<&str> for HandlerSpecifier {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for HandlerSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.location, self.export)
    }
}

/// Handler resolution failures.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("handler not found: {0}")]
    NotFound(HandlerSpecifier),

    #[error("failed to load handler {specifier}: {reason}")]
    LoadFailed {
        specifier: HandlerSpecifier,
        reason: String,
    },
}

/// A failure raised by handler code.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid handler payload: {}", err))
    }
}

/// A resolved handler function.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(
        &self,
        event: InvocationEvent,
        context: ExecutionContext,
    ) -> Result<Option<Value>, HandlerError>;
}

/// Resolves handler specifiers to callable handlers.
#[async_trait]
pub trait HandlerLoader: Send + Sync {
    async fn resolve(&self, specifier: &HandlerSpecifier) -> Result<Arc<dyn Handler>, LoaderError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(InvocationEvent, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send,
{
    async fn invoke(
        &self,
        event: InvocationEvent,
        context: ExecutionContext,
    ) -> Result<Option<Value>, HandlerError> {
        (self.0)(event, context).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(InvocationEvent, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// In-process loader backed by a specifier → handler map.
#[derive(Default, Clone)]
pub struct StaticHandlerLoader {
    handlers: Arc<DashMap<HandlerSpecifier, Arc<dyn Handler>>>,
}

impl StaticHandlerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, specifier: impl Into<HandlerSpecifier>, handler: Arc<dyn Handler>) {
        self.handlers.insert(specifier.into(), handler);
    }

    pub fn with_handler(self, specifier: impl Into<HandlerSpecifier>, handler: Arc<dyn Handler>) -> Self {
        self.register(specifier, handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl HandlerLoader for StaticHandlerLoader {
    async fn resolve(&self, specifier: &HandlerSpecifier) -> Result<Arc<dyn Handler>, LoaderError> {
        self.handlers
            .get(specifier)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LoaderError::NotFound(specifier.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_location_and_export() {
        let spec = HandlerSpecifier::parse("handlers/users.get");
        assert_eq!(spec.location, "handlers/users");
        assert_eq!(spec.export, "get");
        assert_eq!(spec.to_string(), "handlers/users.get");
    }

    #[test]
    fn dots_in_directories_are_not_exports() {
        let spec = HandlerSpecifier::parse("./src.v2/handler");
        assert_eq!(spec.location, "./src.v2/handler");
        assert_eq!(spec.export, "handler");

        let spec = HandlerSpecifier::parse("src/app.module.main");
        assert_eq!(spec.location, "src/app.module");
        assert_eq!(spec.export, "main");
    }

    #[test]
    fn hidden_file_without_export_keeps_default() {
        let spec = HandlerSpecifier::parse("bin/.hidden");
        assert_eq!(spec.location, "bin/.hidden");
        assert_eq!(spec.export, "handler");
    }

    #[tokio::test]
    async fn static_loader_resolves_registered_handlers() {
        let loader = StaticHandlerLoader::new().with_handler(
            "app.ping",
            handler_fn(|_event, _ctx| async { Ok(Some(json!("pong"))) }),
        );

        assert!(loader.resolve(&"app.ping".into()).await.is_ok());
        let err = loader.resolve(&"app.missing".into()).await.err().unwrap();
        assert!(matches!(err, LoaderError::NotFound(_)));
    }
}
