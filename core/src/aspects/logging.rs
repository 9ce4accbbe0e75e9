use crate::aspect::{Aspect, Next};
use crate::context::ExecutionContext;
use crate::error::Result;
use std::time::Instant;

/// Traces every matching operation: entry, exit with elapsed time, and the
/// class of any failure. Failures are always passed on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAspect;

impl LoggingAspect {
    /// Create the aspect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Aspect for LoggingAspect {
    fn around(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()> {
        let started = Instant::now();
        tracing::info!(
            operation = %ctx.operation().path,
            method = %ctx.operation().method,
            arguments = ctx.arity(),
            "Operation started"
        );

        let outcome = next.run(ctx);
        let elapsed_ms = started.elapsed().as_millis();

        match &outcome {
            Ok(()) => tracing::info!(
                operation = %ctx.operation().path,
                elapsed_ms,
                results = ctx.results().len(),
                "Operation finished"
            ),
            Err(err) => tracing::warn!(
                operation = %ctx.operation().path,
                elapsed_ms,
                kind = err.kind(),
                error = %err,
                "Operation failed"
            ),
        }

        outcome
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aspect::BaseInvocation;
    use crate::error::RuntimeError;
    use crate::operation::{ControllerDescriptor, OperationDescriptor};
    use crate::request::{Request, RequestHandle};
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            Arc::new(OperationDescriptor::get("/api/ping")),
            Arc::new(ControllerDescriptor::default()),
            RequestHandle::new(Request::new(Method::GET, "/api/ping")),
        )
    }

    #[test]
    fn test_passes_results_through() {
        let mut ctx = context();
        let base: &BaseInvocation<'_> = &|ctx| {
            ctx.set_result(0, json!("pong"));
            Ok(())
        };
        LoggingAspect.around(&mut ctx, Next::new(&[], base)).unwrap();
        assert_eq!(ctx.results(), [json!("pong")]);
    }

    #[test]
    fn test_never_swallows_failures() {
        let mut ctx = context();
        let base: &BaseInvocation<'_> = &|_| Err(RuntimeError::new(503, "busy").into());
        let err = LoggingAspect.around(&mut ctx, Next::new(&[], base)).unwrap_err();
        assert_eq!(err.as_runtime().map(|e| e.code), Some(503));
    }
}
