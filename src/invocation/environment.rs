//! Process environment overlay.
//!
//! Handlers that read ambient process configuration see the invocation's
//! environment map for the duration of the call. The preferred channel is
//! [`ExecutionContext::env`](crate::invocation::context::ExecutionContext::env);
//! this overlay is the compatibility shim.
//!
//! # Known race
//! The process environment is global. Two invocations whose windows overlap
//! and whose maps differ observe each other's values, and a restore that runs
//! out of order can leave the other invocation's value behind after both
//! guards are dropped. Guards restore in reverse application order only
//! within one overlay; nothing orders separate overlays.

use std::collections::HashMap;

/// Applied variables, restored when dropped.
#[must_use = "the overlay is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EnvironmentOverlay {
    previous: Vec<(String, Option<String>)>,
}

impl EnvironmentOverlay {
    /// Snapshot and overwrite each variable in `vars`.
    ///
    /// Keys that cannot be set (empty, containing `=` or NUL) and values
    /// containing NUL are skipped.
    pub fn apply(vars: &HashMap<String, String>) -> Self {
        let mut previous = Vec::with_capacity(vars.len());

        for (key, value) in vars {
            if !is_settable(key, value) {
                tracing::warn!(key = %key, "Skipping environment variable that cannot be set");
                continue;
            }
            previous.push((key.clone(), std::env::var(key).ok()));
            std::env::set_var(key, value);
        }

        Self { previous }
    }

    /// Number of variables this overlay touched.
    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}

impl Drop for EnvironmentOverlay {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn is_settable(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains('=') && !key.contains('\0') && !value.contains('\0')
}
