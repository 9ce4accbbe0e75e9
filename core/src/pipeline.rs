//! Parameter pipeline: fills the argument slots of a context before the
//! handler is called.

use crate::common::{CommonParamRegistry, CommonParams};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{Result, ValidationError};
use crate::handler::Resolver;
use crate::param::{ResolveContext, Resolved};
use crate::validation::Validator;

/// Borrowed view of the registries a dispatch resolves parameters against.
#[derive(Debug, Clone, Copy)]
pub struct ParameterPipeline<'a> {
    common: &'a CommonParamRegistry,
    validator: &'a Validator,
    config: &'a EngineConfig,
}

impl<'a> ParameterPipeline<'a> {
    /// Create a pipeline over the given registries.
    #[must_use]
    pub const fn new(
        common: &'a CommonParamRegistry,
        validator: &'a Validator,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            common,
            validator,
            config,
        }
    }

    /// Resolve every empty argument slot of `ctx`, in order.
    ///
    /// Slots an aspect filled before the handler runs are left alone.
    /// Common-parameter overrides are computed once per call and take
    /// precedence over the request.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] as soon as one argument carries
    /// violations; that argument's instance is stored first so outer aspects
    /// can inspect it. Resource parameters fail when their resource is
    /// missing.
    pub fn populate(&self, ctx: &mut ExecutionContext, resolvers: &[Resolver]) -> Result<()> {
        let operation = ctx.operation_handle();
        let overrides = if self.common.is_empty() {
            CommonParams::new()
        } else {
            self.common.resolve(&operation.path, ctx.request())
        };

        for (index, (resolver, spec)) in resolvers.iter().zip(&operation.parameters).enumerate() {
            if ctx.has_argument(index) {
                continue;
            }

            let Resolved { value, violations } = {
                let cx = ResolveContext {
                    request: ctx.request(),
                    response: ctx.response(),
                    side_channel: ctx.side_channel(),
                    operation: &operation,
                    spec,
                    config: self.config,
                    validator: self.validator,
                };
                resolver(&cx, overrides.get(&spec.name))?
            };

            ctx.store_argument(index, value);
            if !violations.is_empty() {
                return Err(ValidationError::new(violations).into());
            }
        }

        Ok(())
    }
}
