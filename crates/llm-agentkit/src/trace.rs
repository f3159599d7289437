//! Request-scoped, nested timing instrumentation.
//!
//! A [`TraceScope`] carries the [`RunContext`] of one run. Measuring an
//! operation opens a `trace_scope` span one level deeper than the current
//! scope and hands the child scope to the measured closure, so nesting follows
//! the call structure instead of captured state.
//!
//! ```rust
//! use llm_agentkit::trace::TraceScope;
//!
//! # async fn demo() -> Result<(), String> {
//! let root = TraceScope::root("agent.run");
//! let total = root
//!     .measure("outer", |scope| async move {
//!         let inner = scope.measure("inner", |_| async { Ok::<_, String>(2) }).await?;
//!         Ok::<_, String>(inner + 1)
//!     })
//!     .await?;
//! assert_eq!(total, 3);
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

/// Identity of one run, shared by every scope it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    request_id: String,
    depth: usize,
}

impl RunContext {
    /// Creates a depth-0 context with a fresh request id.
    pub fn new() -> Self {
        Self::with_request_id(generate_request_id())
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            depth: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn descend(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            depth: self.depth + 1,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns 16 lowercase hex characters.
pub fn generate_request_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// A named position in a run's scope tree.
#[derive(Debug, Clone)]
pub struct TraceScope {
    context: RunContext,
    name: String,
}

impl TraceScope {
    /// Opens the root scope of a new run.
    pub fn root(name: impl Into<String>) -> Self {
        Self::with_context(RunContext::new(), name)
    }

    pub fn with_context(context: RunContext, name: impl Into<String>) -> Self {
        Self {
            context,
            name: name.into(),
        }
    }

    /// Returns a scope one level deeper, sharing the request id.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::with_context(self.context.descend(), name)
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn request_id(&self) -> &str {
        self.context.request_id()
    }

    pub fn depth(&self) -> usize {
        self.context.depth()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `operation` inside a child scope named `op`, logging entry, exit
    /// and elapsed time. Errors are logged and returned unchanged.
    pub async fn measure<T, E, F, Fut>(&self, op: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce(TraceScope) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let child = self.child(op);
        let span = info_span!(
            "trace_scope",
            request_id = %child.request_id(),
            depth = child.depth(),
            op = %op,
        );
        let indent = indent(child.depth());

        async move {
            info!("{indent}-> {op}");
            let started = Instant::now();
            let result = operation(child).await;
            log_exit(&indent, op, started, &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Synchronous counterpart of [`measure`](Self::measure).
    pub fn measure_sync<T, E, F>(&self, op: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce(TraceScope) -> Result<T, E>,
        E: Display,
    {
        let child = self.child(op);
        let span = info_span!(
            "trace_scope",
            request_id = %child.request_id(),
            depth = child.depth(),
            op = %op,
        );
        let _entered = span.enter();
        let indent = indent(child.depth());

        info!("{indent}-> {op}");
        let started = Instant::now();
        let result = operation(child);
        log_exit(&indent, op, started, &result);
        result
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth.saturating_sub(1))
}

fn log_exit<T, E: Display>(indent: &str, op: &str, started: Instant, result: &Result<T, E>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) => info!(elapsed_ms, "{indent}<- {op} ({elapsed_ms}ms)"),
        Err(error) => warn!(elapsed_ms, %error, "{indent}<- {op} failed ({elapsed_ms}ms)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_child_shares_request_id_and_descends() {
        let root = TraceScope::with_context(RunContext::with_request_id("abc"), "run");
        let child = root.child("stage");
        let grandchild = child.child("call");

        assert_eq!(root.depth(), 0);
        assert_eq!(child.depth(), 1);
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.request_id(), "abc");
        assert_eq!(grandchild.name(), "call");
    }

    #[tokio::test]
    async fn test_measure_passes_child_scope_and_result() {
        let root = TraceScope::root("run");
        let seen = root
            .measure("stage", |scope| async move {
                Ok::<_, String>((scope.depth(), scope.name().to_string()))
            })
            .await;
        assert_eq!(seen, Ok((1, "stage".to_string())));
    }

    #[tokio::test]
    async fn test_measure_returns_errors_unchanged() {
        let root = TraceScope::root("run");
        let result: Result<(), String> = root
            .measure("failing", |_| async { Err("boom".to_string()) })
            .await;
        assert_eq!(result, Err("boom".to_string()));
    }

    #[test]
    fn test_measure_sync_nests() {
        let root = TraceScope::root("run");
        let depth = root.measure_sync("outer", |scope| {
            scope.measure_sync("inner", |inner| Ok::<_, String>(inner.depth()))
        });
        assert_eq!(depth, Ok(2));
    }
}
