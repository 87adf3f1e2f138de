//! Per-invocation execution context.
//!
//! The remaining-time clock is closed over the context's own start instant,
//! so two contexts never share state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::events::ACCOUNT_ID;

const REGION: &str = "us-east-1";
const FUNCTION_VERSION: &str = "$LATEST";

/// Identity and budget of one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    function_name: String,
    aws_request_id: String,
    memory_limit_mb: u32,
    timeout: Duration,
    started_at: Instant,
    log_stream_name: String,
    environment: HashMap<String, String>,
}

/// Serializable view of a context, handed to out-of-process handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub function_name: String,
    pub function_version: String,
    pub invoked_function_arn: String,
    pub memory_limit_in_mb: u32,
    pub aws_request_id: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub remaining_time_in_millis: u64,
}

impl ExecutionContext {
    /// Start the clock for a new invocation.
    pub fn new(
        function_name: impl Into<String>,
        request_id: impl Into<String>,
        memory_limit_mb: u32,
        timeout_secs: u64,
    ) -> Self {
        let now = chrono::Utc::now();
        let aws_request_id = request_id.into();
        Self {
            function_name: function_name.into(),
            log_stream_name: format!(
                "{}/[{}]{}",
                now.format("%Y/%m/%d"),
                FUNCTION_VERSION,
                &aws_request_id
            ),
            aws_request_id,
            memory_limit_mb,
            timeout: Duration::from_secs(timeout_secs),
            started_at: Instant::now(),
            environment: HashMap::new(),
        }
    }

    /// Attach the invocation's configuration map.
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Budget left, in milliseconds; never negative.
    pub fn remaining_time_millis(&self) -> u64 {
        let elapsed = self.started_at.elapsed().as_millis();
        let budget = self.timeout.as_millis();
        u64::try_from(budget.saturating_sub(elapsed)).unwrap_or(u64::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn timed_out(&self) -> bool {
        self.started_at.elapsed() >= self.timeout
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn aws_request_id(&self) -> &str {
        &self.aws_request_id
    }

    pub fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Explicit per-invocation configuration (global map overlaid with the
    /// function's own).
    pub fn env(&self) -> &HashMap<String, String> {
        &self.environment
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }

    pub fn invoked_function_arn(&self) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            REGION, ACCOUNT_ID, self.function_name
        )
    }

    pub fn log_group_name(&self) -> String {
        format!("/aws/lambda/{}", self.function_name)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            function_name: self.function_name.clone(),
            function_version: FUNCTION_VERSION.to_string(),
            invoked_function_arn: self.invoked_function_arn(),
            memory_limit_in_mb: self.memory_limit_mb,
            aws_request_id: self.aws_request_id.clone(),
            log_group_name: self.log_group_name(),
            log_stream_name: self.log_stream_name.clone(),
            remaining_time_in_millis: self.remaining_time_millis(),
        }
    }

    #[cfg(test)]
    pub(crate) fn started_before(mut self, elapsed: Duration) -> Self {
        if let Some(earlier) = Instant::now().checked_sub(elapsed) {
            self.started_at = earlier;
        }
        self
    }
}

/// Build a fresh context for one invocation.
pub fn create_context(
    function_name: &str,
    request_id: &str,
    memory_limit_mb: u32,
    timeout_secs: u64,
) -> ExecutionContext {
    ExecutionContext::new(function_name, request_id, memory_limit_mb, timeout_secs)
}
