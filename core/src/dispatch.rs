//! Dispatcher: owns the registries and runs operations.
//!
//! A call goes through four steps:
//!
//! 1. A fresh [`ExecutionContext`] is allocated for the operation.
//! 2. The aspects matching the operation's full path are snapshotted,
//!    highest priority first.
//! 3. The chain runs: each aspect receives a [`Next`] standing for the
//!    rest of the chain, and the innermost step resolves the parameters and
//!    calls the handler.
//! 4. The outcome is written back: `results[0]` as JSON when automatic
//!    return is on, otherwise whatever an aspect wrote.
//!
//! # Example
//!
//! ```
//! use http::Method;
//! use weave_core::dispatch::{Controller, Dispatcher};
//! use weave_core::handler::Json;
//! use weave_core::operation::OperationDescriptor;
//! use weave_core::request::Request;
//!
//! let mut dispatcher = Dispatcher::default();
//! let ops = dispatcher
//!     .register_controller(
//!         Controller::new("math", "/api").operation(
//!             OperationDescriptor::get("/double").param("n"),
//!             |n: i64| Ok(Json(n * 2)),
//!         ),
//!     )
//!     .unwrap();
//!
//! let response = dispatcher
//!     .dispatch(&ops[0], Request::new(Method::GET, "/api/double?n=21"))
//!     .unwrap();
//! assert_eq!(response.text(), "42");
//! ```

use crate::aspect::{Aspect, AspectDefinition, AspectRegistry, Next};
use crate::aspects::ErrorMappingAspect;
use crate::common::CommonParamRegistry;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{RegistrationError, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::operation::{ControllerDescriptor, OperationDescriptor};
use crate::pipeline::ParameterPipeline;
use crate::request::{Request, RequestHandle, Response};
use crate::transaction::{TRANSACTION_PATTERN, TransactionAspect, TransactionDriver};
use crate::validation::Validator;
use http::{Method, StatusCode};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Paths covered by the error-mapping aspect.
const ERROR_MAPPING_PATTERN: &str = "/**";

/// Register an aspect the dispatcher installs itself. A failure is logged
/// and reported as `false`.
fn register_builtin<A: Aspect>(registry: &AspectRegistry, pattern: &str, priority: i32, aspect: A) -> bool {
    match registry.register_aspect(pattern, priority, aspect) {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(error = %err, aspect = pattern, "Built-in aspect not registered");
            false
        }
    }
}

/// A registered operation: descriptor, controller and erased handler.
pub struct Operation {
    descriptor: Arc<OperationDescriptor>,
    controller: Arc<ControllerDescriptor>,
    handler: BoxedHandler,
}

impl Operation {
    /// Final descriptor, with the full path and every parameter spec filled.
    #[must_use]
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Controller the operation belongs to.
    #[must_use]
    pub fn controller(&self) -> &ControllerDescriptor {
        &self.controller
    }

    /// Full path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.descriptor.path
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.descriptor.method
    }

    /// Number of handler arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.handler.arity()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("method", &self.descriptor.method)
            .field("path", &self.descriptor.path)
            .field("controller", &self.controller.name)
            .field("arity", &self.handler.arity())
            .finish()
    }
}

/// A group of operations sharing a mount prefix.
///
/// ```
/// use weave_core::dispatch::Controller;
/// use weave_core::operation::OperationDescriptor;
///
/// let users = Controller::new("users", "/api/users")
///     .transactional()
///     .operation(OperationDescriptor::get("/count"), || Ok(()));
/// assert_eq!(users.descriptor().path, "/api/users");
/// ```
pub struct Controller {
    descriptor: ControllerDescriptor,
    operations: Vec<(OperationDescriptor, BoxedHandler)>,
}

impl Controller {
    /// Create a controller mounted at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            descriptor: ControllerDescriptor::new(name, path),
            operations: Vec::new(),
        }
    }

    /// Run every operation of this controller inside a transaction.
    #[must_use]
    pub fn transactional(mut self) -> Self {
        self.descriptor.transaction = true;
        self
    }

    /// Add an operation. Its path is relative to the controller's mount.
    #[must_use]
    pub fn operation<H, Args>(mut self, descriptor: OperationDescriptor, handler: H) -> Self
    where
        H: Handler<Args>,
    {
        self.operations.push((descriptor, BoxedHandler::new(handler)));
        self
    }

    /// Controller descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ControllerDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("descriptor", &self.descriptor)
            .field("operations", &self.operations.len())
            .finish()
    }
}

/// Dispatch engine.
///
/// Owns the aspect registry, the common-parameter registry and the
/// validator. Aspects and suppliers may be registered at any time through
/// [`Dispatcher::aspects`] and [`Dispatcher::common_params`]; operations are
/// registered before the dispatcher is shared.
pub struct Dispatcher {
    aspects: AspectRegistry,
    common: CommonParamRegistry,
    validator: Validator,
    config: EngineConfig,
    operations: Vec<Arc<Operation>>,
    routes: HashSet<(Method, String)>,
    transactions_installed: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher. The error-mapping aspect is installed unless the
    /// configuration turns it off.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let dispatcher = Self {
            aspects: AspectRegistry::new(),
            common: CommonParamRegistry::new(),
            validator: Validator::new(),
            config,
            operations: Vec::new(),
            routes: HashSet::new(),
            transactions_installed: AtomicBool::new(false),
        };

        if dispatcher.config.error_mapping {
            register_builtin(
                &dispatcher.aspects,
                ERROR_MAPPING_PATTERN,
                dispatcher.config.error_mapping_priority,
                ErrorMappingAspect::new(),
            );
        }
        dispatcher
    }

    /// Aspect registry.
    #[must_use]
    pub const fn aspects(&self) -> &AspectRegistry {
        &self.aspects
    }

    /// Common-parameter registry.
    #[must_use]
    pub const fn common_params(&self) -> &CommonParamRegistry {
        &self.common
    }

    /// Shared validator.
    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the transaction aspect over `driver` on every path.
    ///
    /// Only the first successful call installs anything; later calls return
    /// `false` and drop their driver. A registration failure is logged and
    /// also returns `false`.
    pub fn install_transactions<D: TransactionDriver>(&self, driver: D) -> bool {
        if self.transactions_installed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Transaction aspect already installed");
            return false;
        }

        let installed = register_builtin(
            &self.aspects,
            TRANSACTION_PATTERN,
            self.config.transaction_priority,
            TransactionAspect::new(driver),
        );
        if !installed {
            self.transactions_installed.store(false, Ordering::SeqCst);
        }
        installed
    }

    /// Register a single operation outside any controller.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::register_controller`].
    pub fn register<H, Args>(
        &mut self,
        descriptor: OperationDescriptor,
        handler: H,
    ) -> std::result::Result<Arc<Operation>, RegistrationError>
    where
        H: Handler<Args>,
    {
        let controller = Arc::new(ControllerDescriptor::default());
        let operation = self.stage(
            &controller,
            descriptor,
            BoxedHandler::new(handler),
            &mut HashSet::new(),
        )?;
        self.commit(std::slice::from_ref(&operation));
        Ok(operation)
    }

    /// Register every operation of `controller`.
    ///
    /// Each descriptor's path is joined to the controller's mount, and
    /// parameter specs the descriptor leaves out are filled with defaults.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::ParameterMismatch`] if a descriptor declares
    ///   more parameters than its handler accepts
    /// - [`RegistrationError::DuplicateOperation`] if the method and full
    ///   path are already taken
    ///
    /// Nothing from `controller` is registered when an error is returned.
    pub fn register_controller(
        &mut self,
        controller: Controller,
    ) -> std::result::Result<Vec<Arc<Operation>>, RegistrationError> {
        let Controller {
            descriptor,
            operations,
        } = controller;
        let descriptor = Arc::new(descriptor);

        let mut pending = HashSet::new();
        let staged = operations
            .into_iter()
            .map(|(op, handler)| self.stage(&descriptor, op, handler, &mut pending))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.commit(&staged);
        Ok(staged)
    }

    fn stage(
        &self,
        controller: &Arc<ControllerDescriptor>,
        mut descriptor: OperationDescriptor,
        handler: BoxedHandler,
        pending: &mut HashSet<(Method, String)>,
    ) -> std::result::Result<Arc<Operation>, RegistrationError> {
        descriptor.path = controller.full_path(&descriptor.path);

        let accepted = handler.arity();
        if descriptor.parameters.len() > accepted {
            return Err(RegistrationError::ParameterMismatch {
                path: descriptor.path,
                declared: descriptor.parameters.len(),
                accepted,
            });
        }
        descriptor.finalize(accepted);

        let route = (descriptor.method.clone(), descriptor.path.clone());
        if self.routes.contains(&route) || !pending.insert(route) {
            return Err(RegistrationError::DuplicateOperation {
                method: descriptor.method.to_string(),
                path: descriptor.path,
            });
        }

        Ok(Arc::new(Operation {
            descriptor: Arc::new(descriptor),
            controller: Arc::clone(controller),
            handler,
        }))
    }

    fn commit(&mut self, staged: &[Arc<Operation>]) {
        for operation in staged {
            tracing::debug!(
                controller = %operation.controller.name,
                method = %operation.descriptor.method,
                path = %operation.descriptor.path,
                arity = operation.arity(),
                "Registering operation"
            );
            self.routes.insert((
                operation.descriptor.method.clone(),
                operation.descriptor.path.clone(),
            ));
            self.operations.push(Arc::clone(operation));
        }
    }

    /// Registered operations, in registration order.
    #[must_use]
    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    /// Look up an operation by method and full path.
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<&Arc<Operation>> {
        self.operations
            .iter()
            .find(|op| op.descriptor.method == *method && op.descriptor.path == path)
    }

    /// Run `operation` for `request`.
    ///
    /// # Errors
    ///
    /// Returns any failure no aspect converted into a response.
    pub fn dispatch(&self, operation: &Operation, request: Request) -> Result<Response> {
        let span = tracing::info_span!(
            "dispatch",
            operation = %operation.controller.name,
            method = %operation.descriptor.method,
            path = %operation.descriptor.path,
        );
        let _entered = span.enter();

        let mut ctx = ExecutionContext::new(
            Arc::clone(&operation.descriptor),
            Arc::clone(&operation.controller),
            RequestHandle::new(request),
        );

        let layers: Vec<Arc<AspectDefinition>> =
            self.aspects.matching(&operation.descriptor.path).collect();
        let pipeline = ParameterPipeline::new(&self.common, &self.validator, &self.config);
        let base = |ctx: &mut ExecutionContext| -> Result<()> {
            pipeline.populate(ctx, operation.handler.resolvers())?;
            let results = operation.handler.call(ctx.raw_arguments())?;
            ctx.store_results(results);
            Ok(())
        };

        tracing::trace!(aspects = layers.len(), "Running chain");
        Next::new(&layers, &base).run(&mut ctx)?;
        write_back(&ctx)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("aspects", &self.aspects)
            .field("common", &self.common)
            .field("operations", &self.operations)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn write_back(ctx: &ExecutionContext) -> Result<Response> {
    let written = ctx.response().take();
    if !ctx.auto_return() {
        return Ok(written.unwrap_or_default());
    }

    match ctx.results().first() {
        Some(value) => Response::json(StatusCode::OK, value).map_err(|err| anyhow::Error::from(err).into()),
        None => Ok(written.unwrap_or_else(|| Response::empty(StatusCode::OK))),
    }
}
