use crate::aspect::{Aspect, Next};
use crate::context::ExecutionContext;
use crate::error::{DispatchError, Result};
use http::StatusCode;
use serde_json::json;

/// Conventional priority of the error-mapping aspect: outside the
/// transaction aspect, so the rollback has happened by the time the failure
/// is turned into a response.
pub const ERROR_MAPPING_PRIORITY: i32 = 100;

/// Writes validation and runtime failures as JSON responses.
///
/// - [`ValidationError`](crate::error::ValidationError) becomes
///   `400 {"success": false, "messages": [...]}`
/// - [`RuntimeError`](crate::error::RuntimeError) becomes
///   `{code} {"success": false, "message": "..."}`
///
/// Both switch automatic result writing off. Other failures propagate
/// unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorMappingAspect;

impl ErrorMappingAspect {
    /// Create the aspect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Aspect for ErrorMappingAspect {
    fn around(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()> {
        let (status, body) = match next.run(ctx) {
            Ok(()) => return Ok(()),
            Err(DispatchError::Validation(err)) => {
                tracing::warn!(
                    operation = %ctx.operation().path,
                    violations = err.len(),
                    "Validation failed"
                );
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "success": false, "messages": err.messages() }),
                )
            }
            Err(DispatchError::Runtime(err)) => {
                tracing::warn!(
                    operation = %ctx.operation().path,
                    code = err.code,
                    message = %err.message,
                    "Runtime error"
                );
                let status =
                    StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, json!({ "success": false, "message": err.message }))
            }
            Err(other) => return Err(other),
        };

        ctx.response()
            .write_json(status, &body)
            .map_err(anyhow::Error::from)?;
        ctx.set_auto_return(false);
        Ok(())
    }

    fn name(&self) -> &str {
        "error_mapping"
    }
}
