//! Executable handlers.
//!
//! A handler location names an executable under the handlers directory. Each
//! invocation spawns it with the invocation's environment, writes
//! `{"event": .., "context": ..}` to stdin and reads the result JSON from
//! stdout. Empty stdout means "no result"; a non-zero exit is a handler error
//! carrying stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::events::InvocationEvent;
use crate::invocation::context::ExecutionContext;
use crate::invocation::loader::{Handler, HandlerError, HandlerLoader, HandlerSpecifier, LoaderError};

/// Resolves specifiers to executables relative to a base directory.
#[derive(Debug, Clone)]
pub struct ProcessHandlerLoader {
    base_dir: PathBuf,
}

impl ProcessHandlerLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl HandlerLoader for ProcessHandlerLoader {
    async fn resolve(&self, specifier: &HandlerSpecifier) -> Result<Arc<dyn Handler>, LoaderError> {
        let program = self.base_dir.join(&specifier.location);
        match tokio::fs::metadata(&program).await {
            Ok(meta) if meta.is_file() => Ok(Arc::new(ProcessHandler {
                program,
                specifier: specifier.clone(),
            })),
            Ok(_) => Err(LoaderError::LoadFailed {
                specifier: specifier.clone(),
                reason: format!("{} is not a file", program.display()),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(LoaderError::NotFound(specifier.clone()))
            }
            Err(err) => Err(LoaderError::LoadFailed {
                specifier: specifier.clone(),
                reason: err.to_string(),
            }),
        }
    }
}

struct ProcessHandler {
    program: PathBuf,
    specifier: HandlerSpecifier,
}

#[async_trait]
impl Handler for ProcessHandler {
    async fn invoke(
        &self,
        event: InvocationEvent,
        context: ExecutionContext,
    ) -> Result<Option<Value>, HandlerError> {
        let input = serde_json::to_vec(&json!({
            "event": event,
            "context": context.snapshot(),
        }))?;

        let mut child = Command::new(&self.program)
            .envs(context.env())
            .env("_HANDLER", self.specifier.to_string())
            .env("HANDLER_EXPORT", &self.specifier.export)
            .env("AWS_LAMBDA_FUNCTION_NAME", context.function_name())
            .env(
                "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
                context.memory_limit_mb().to_string(),
            )
            .env(
                "AWS_LAMBDA_FUNCTION_TIMEOUT",
                context.timeout().as_secs().to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HandlerError::new(format!("failed to spawn {}: {}", self.program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(error = %e, "Handler closed stdin early");
                }
            });
        }

        let output = child.wait_with_output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(
                function = %context.function_name(),
                request_id = %context.aws_request_id(),
                stderr = %stderr.trim(),
                "Handler stderr"
            );
        }

        if !output.status.success() {
            return Err(HandlerError::new(format!(
                "handler exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(stdout.trim())?))
    }
}
