//! Per-invocation execution context.
//!
//! One [`ExecutionContext`] exists per in-flight operation call. It is owned
//! by the dispatcher for the duration of the call and lent mutably to each
//! aspect and finally to the base invocation, so it is never shared between
//! concurrent calls.
//!
//! Arguments, argument names and results are index-aligned: slot `i` of each
//! refers to handler parameter `i` (results to return value `i`).

use crate::operation::{ControllerDescriptor, OperationDescriptor};
use crate::request::{RequestHandle, ResponseHandle};
use http::Extensions;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased argument value.
pub type Argument = Box<dyn Any + Send>;

/// Mutable carrier for one operation call.
pub struct ExecutionContext {
    arguments: Vec<Option<Argument>>,
    argument_names: Vec<String>,
    results: Vec<Value>,
    auto_return: bool,
    operation: Arc<OperationDescriptor>,
    controller: Arc<ControllerDescriptor>,
    request: RequestHandle,
    response: ResponseHandle,
    side_channel: Extensions,
}

impl ExecutionContext {
    /// Allocate a context sized to the operation's parameter list.
    ///
    /// Argument slots start empty; names are taken from the parameter specs.
    #[must_use]
    pub fn new(
        operation: Arc<OperationDescriptor>,
        controller: Arc<ControllerDescriptor>,
        request: RequestHandle,
    ) -> Self {
        let argument_names: Vec<String> = operation
            .parameters
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        let arguments = std::iter::repeat_with(|| None)
            .take(argument_names.len())
            .collect();

        Self {
            arguments,
            argument_names,
            results: Vec::new(),
            auto_return: true,
            operation,
            controller,
            request,
            response: ResponseHandle::new(),
            side_channel: Extensions::new(),
        }
    }

    /// Number of argument slots.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    /// Borrow argument `index` as `T`.
    ///
    /// Returns `None` if the slot is out of range, still empty, or holds a
    /// different type.
    #[must_use]
    pub fn argument<T: Any>(&self, index: usize) -> Option<&T> {
        self.arguments
            .get(index)?
            .as_ref()?
            .downcast_ref::<T>()
    }

    /// Mutably borrow argument `index` as `T`.
    pub fn argument_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.arguments
            .get_mut(index)?
            .as_mut()?
            .downcast_mut::<T>()
    }

    /// Replace argument `index`.
    ///
    /// A slot set before the base invocation runs is kept by the parameter
    /// pipeline instead of being resolved from the request. Out-of-range
    /// indices are ignored and reported as `false`.
    pub fn set_argument<T: Any + Send>(&mut self, index: usize, value: T) -> bool {
        match self.arguments.get_mut(index) {
            Some(slot) => {
                *slot = Some(Box::new(value));
                true
            }
            None => false,
        }
    }

    /// Whether argument `index` holds a value.
    #[must_use]
    pub fn has_argument(&self, index: usize) -> bool {
        self.arguments.get(index).is_some_and(Option::is_some)
    }

    pub(crate) fn store_argument(&mut self, index: usize, value: Argument) {
        if let Some(slot) = self.arguments.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub(crate) fn raw_arguments(&self) -> &[Option<Argument>] {
        &self.arguments
    }

    /// Parameter names, index-aligned with the arguments.
    #[must_use]
    pub fn argument_names(&self) -> &[String] {
        &self.argument_names
    }

    /// Results of the handler. Empty until the base invocation completes.
    #[must_use]
    pub fn results(&self) -> &[Value] {
        &self.results
    }

    /// Mutable access to the results, for aspects that rewrite them.
    pub fn results_mut(&mut self) -> &mut Vec<Value> {
        &mut self.results
    }

    /// Replace result `index`, growing the list with nulls if needed.
    pub fn set_result(&mut self, index: usize, value: Value) {
        if self.results.len() <= index {
            self.results.resize(index + 1, Value::Null);
        }
        self.results[index] = value;
    }

    pub(crate) fn store_results(&mut self, results: Vec<Value>) {
        self.results = results;
    }

    /// Whether the dispatcher writes `results[0]` after the chain returns.
    #[must_use]
    pub const fn auto_return(&self) -> bool {
        self.auto_return
    }

    /// Turn automatic result writing on or off. Aspects that write their own
    /// response switch it off.
    pub const fn set_auto_return(&mut self, auto_return: bool) {
        self.auto_return = auto_return;
    }

    /// Descriptor of the operation being called.
    #[must_use]
    pub fn operation(&self) -> &OperationDescriptor {
        &self.operation
    }

    pub(crate) fn operation_handle(&self) -> Arc<OperationDescriptor> {
        Arc::clone(&self.operation)
    }

    /// Descriptor of the controller the operation belongs to.
    #[must_use]
    pub fn controller(&self) -> &ControllerDescriptor {
        &self.controller
    }

    /// Whether this call runs inside a transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.operation.transaction || self.controller.transaction
    }

    /// The inbound request.
    #[must_use]
    pub const fn request(&self) -> &RequestHandle {
        &self.request
    }

    /// Slot for a directly written response.
    #[must_use]
    pub const fn response(&self) -> &ResponseHandle {
        &self.response
    }

    /// Request-scoped resources.
    #[must_use]
    pub const fn side_channel(&self) -> &Extensions {
        &self.side_channel
    }

    /// Mutable request-scoped resources.
    pub const fn side_channel_mut(&mut self) -> &mut Extensions {
        &mut self.side_channel
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("operation", &self.operation.path)
            .field("method", &self.operation.method)
            .field("argument_names", &self.argument_names)
            .field(
                "populated",
                &self.arguments.iter().filter(|a| a.is_some()).count(),
            )
            .field("results", &self.results)
            .field("auto_return", &self.auto_return)
            .finish_non_exhaustive()
    }
}
