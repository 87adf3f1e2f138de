//! Handler invocation subsystem.
//!
//! # Data Flow
//! ```text
//! InvocationEvent + InvocationTarget
//!     → context.rs (fresh ExecutionContext, remaining-time clock)
//!     → environment.rs (process env overlay applied)
//!     → loader.rs (specifier → Handler)
//!     → Handler::invoke
//!     → overlay restored (success, error or panic unwind)
//!     → Option<serde_json::Value>
//! ```
//!
//! # Design Decisions
//! - The environment map travels explicitly on the context; the process
//!   overlay is a switchable compatibility shim
//! - Timeouts are advisory: overruns are logged, never cancelled
//! - No retries
//! - A handler panic is caught and reported as a handler failure

pub mod context;
pub mod environment;
pub mod loader;
pub mod process;

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::events::ids::generate_request_id;
use crate::events::InvocationEvent;
use crate::observability::metrics;

pub use context::{create_context, ContextSnapshot, ExecutionContext};
pub use environment::EnvironmentOverlay;
pub use loader::{
    handler_fn, Handler, HandlerError, HandlerLoader, HandlerSpecifier, LoaderError,
    StaticHandlerLoader,
};
pub use process::ProcessHandlerLoader;

/// Everything needed to invoke one configured function.
#[derive(Debug, Clone)]
pub struct InvocationTarget {
    pub function_id: String,
    pub handler: HandlerSpecifier,
    pub memory_mb: u32,
    pub timeout_secs: u64,
    /// Global map overlaid with the function's own (function wins).
    pub environment: HashMap<String, String>,
}

impl InvocationTarget {
    pub fn new(
        function_id: impl Into<String>,
        handler: HandlerSpecifier,
        memory_mb: u32,
        timeout_secs: u64,
        global_env: &HashMap<String, String>,
        function_env: &HashMap<String, String>,
    ) -> Self {
        let mut environment = global_env.clone();
        environment.extend(function_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            function_id: function_id.into(),
            handler,
            memory_mb,
            timeout_secs,
            environment,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Unresolvable(#[from] LoaderError),

    #[error("handler for {function} failed: {source}")]
    Failed {
        function: String,
        #[source]
        source: HandlerError,
    },
}

/// Runs handlers through a loader with the overlay discipline.
#[derive(Clone)]
pub struct Invoker {
    loader: Arc<dyn HandlerLoader>,
    apply_process_environment: bool,
}

impl Invoker {
    pub fn new(loader: Arc<dyn HandlerLoader>, apply_process_environment: bool) -> Self {
        Self {
            loader,
            apply_process_environment,
        }
    }

    pub async fn invoke(
        &self,
        target: &InvocationTarget,
        event: InvocationEvent,
    ) -> Result<Option<Value>, InvocationError> {
        let context = create_context(
            &target.function_id,
            &generate_request_id(),
            target.memory_mb,
            target.timeout_secs,
        )
        .with_environment(target.environment.clone());
        let request_id = context.aws_request_id().to_string();
        let gateway_request_id = event.request_id().to_string();

        tracing::debug!(
            function = %target.function_id,
            request_id = %request_id,
            gateway_request_id = %gateway_request_id,
            handler = %target.handler,
            "Invoking handler"
        );

        let started = Instant::now();
        let outcome = {
            let _overlay = self
                .apply_process_environment
                .then(|| EnvironmentOverlay::apply(&target.environment));

            let call = async {
                match self.loader.resolve(&target.handler).await {
                    Ok(handler) => handler
                        .invoke(event, context.clone())
                        .await
                        .map_err(|source| InvocationError::Failed {
                            function: target.function_id.clone(),
                            source,
                        }),
                    Err(err) => Err(InvocationError::Unresolvable(err)),
                }
            };

            // A panicking handler fails only its own invocation.
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(InvocationError::Failed {
                    function: target.function_id.clone(),
                    source: HandlerError::new(format!(
                        "handler panicked: {}",
                        panic_message(&*payload)
                    )),
                }),
            }
        };
        let elapsed = started.elapsed();

        let label = match &outcome {
            Ok(_) => "success",
            Err(InvocationError::Unresolvable(_)) => "unresolvable",
            Err(InvocationError::Failed { .. }) => "error",
        };
        metrics::record_invocation(&target.function_id, label, elapsed);

        if context.timed_out() {
            tracing::warn!(
                function = %target.function_id,
                request_id = %request_id,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = target.timeout_secs,
                "Handler exceeded its timeout"
            );
        }

        match &outcome {
            Ok(_) => tracing::debug!(
                function = %target.function_id,
                request_id = %request_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Handler completed"
            ),
            Err(e) => tracing::warn!(
                function = %target.function_id,
                request_id = %request_id,
                error = %e,
                "Handler invocation failed"
            ),
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{HttpInvocationEvent, HttpRequestContext, RequestIdentity};
    use serde_json::json;

    fn event() -> InvocationEvent {
        InvocationEvent::Http(HttpInvocationEvent {
            resource: "/".into(),
            path: "/".into(),
            http_method: "GET".into(),
            headers: HashMap::new(),
            multi_value_headers: HashMap::new(),
            query_string_parameters: None,
            multi_value_query_string_parameters: None,
            path_parameters: None,
            stage_variables: None,
            request_context: HttpRequestContext {
                account_id: String::new(),
                api_id: String::new(),
                resource_path: "/".into(),
                http_method: "GET".into(),
                path: "/".into(),
                stage: "local".into(),
                protocol: "HTTP/1.1".into(),
                request_id: "gw-req".into(),
                request_time: String::new(),
                request_time_epoch: 0,
                identity: RequestIdentity::default(),
            },
            body: None,
            is_base64_encoded: false,
        })
    }

    fn target(handler: &str, env: &[(&str, &str)]) -> InvocationTarget {
        let global = HashMap::from([
            ("INVOKER_TEST_STAGE".to_string(), "global".to_string()),
            ("INVOKER_TEST_SHARED".to_string(), "global".to_string()),
        ]);
        let function: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        InvocationTarget::new("fn", HandlerSpecifier::parse(handler), 128, 3, &global, &function)
    }

    #[test]
    fn function_environment_wins_over_global() {
        let target = target("a.handler", &[("INVOKER_TEST_SHARED", "function")]);
        assert_eq!(target.environment["INVOKER_TEST_SHARED"], "function");
        assert_eq!(target.environment["INVOKER_TEST_STAGE"], "global");
    }

    #[tokio::test]
    async fn handler_sees_explicit_and_process_environment() {
        let loader = StaticHandlerLoader::new().with_handler(
            "env.handler",
            handler_fn(|_event, ctx| async move {
                Ok(Some(json!({
                    "context": ctx.env_var("INVOKER_TEST_VAR"),
                    "process": std::env::var("INVOKER_TEST_VAR").ok(),
                })))
            }),
        );
        let invoker = Invoker::new(Arc::new(loader), true);
        let target = target("env.handler", &[("INVOKER_TEST_VAR", "on")]);

        let result = invoker.invoke(&target, event()).await.unwrap().unwrap();
        assert_eq!(result["context"], "on");
        assert_eq!(result["process"], "on");
        assert!(std::env::var("INVOKER_TEST_VAR").is_err());
    }

    #[tokio::test]
    async fn process_overlay_can_be_disabled() {
        let loader = StaticHandlerLoader::new().with_handler(
            "env.handler",
            handler_fn(|_event, ctx| async move {
                Ok(Some(json!({
                    "context": ctx.env_var("INVOKER_TEST_OFF"),
                    "process": std::env::var("INVOKER_TEST_OFF").ok(),
                })))
            }),
        );
        let invoker = Invoker::new(Arc::new(loader), false);
        let target = target("env.handler", &[("INVOKER_TEST_OFF", "on")]);

        let result = invoker.invoke(&target, event()).await.unwrap().unwrap();
        assert_eq!(result["context"], "on");
        assert!(result["process"].is_null());
    }

    #[tokio::test]
    async fn environment_restored_after_failure() {
        let loader = StaticHandlerLoader::new().with_handler(
            "fail.handler",
            handler_fn(|_event, _ctx| async { Err(HandlerError::new("boom")) }),
        );
        let invoker = Invoker::new(Arc::new(loader), true);
        let target = target("fail.handler", &[("INVOKER_TEST_FAIL", "on")]);

        let err = invoker.invoke(&target, event()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed { .. }));
        assert!(std::env::var("INVOKER_TEST_FAIL").is_err());
    }

    #[tokio::test]
    async fn unknown_handler_is_unresolvable() {
        let invoker = Invoker::new(Arc::new(StaticHandlerLoader::new()), true);
        let err = invoker
            .invoke(&target("missing.handler", &[]), event())
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Unresolvable(LoaderError::NotFound(_))));
    }

    async fn explode(
        _event: InvocationEvent,
        _ctx: ExecutionContext,
    ) -> Result<Option<Value>, HandlerError> {
        panic!("handler blew up")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_failure() {
        let loader = StaticHandlerLoader::new().with_handler(
            "panic.handler",
            handler_fn(explode),
        );
        let invoker = Invoker::new(Arc::new(loader), true);
        let target = target("panic.handler", &[("INVOKER_TEST_PANIC", "on")]);

        let err = invoker.invoke(&target, event()).await.unwrap_err();
        match err {
            InvocationError::Failed { function, source } => {
                assert_eq!(function, "fn");
                assert!(source.to_string().contains("handler blew up"));
            }
            other => panic!("expected a handler failure, got {:?}", other),
        }
        assert!(std::env::var("INVOKER_TEST_PANIC").is_err());
    }
}
