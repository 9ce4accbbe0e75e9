//! # Weave Core
//!
//! Aspect interception and request dispatch for plain handler functions.
//!
//! Cross-cutting behavior (validation responses, transactions, logging,
//! injected parameters) is attached to operations by path pattern, without
//! touching handler code.
//!
//! ## Core Concepts
//!
//! - **Operation**: a handler plus an [`OperationDescriptor`] (path, method,
//!   parameter sources, transaction flag)
//! - **Aspect**: an around-advice `(ctx, next) -> Result<()>` registered on a
//!   path pattern with a priority; higher priorities wrap lower ones
//! - **Execution context**: the per-call carrier of arguments, results,
//!   request/response handles and request-scoped resources
//! - **Parameter pipeline**: fills handler arguments from the request by
//!   declared type, applying common-parameter overrides and validation
//! - **Dispatcher**: owns the registries and runs the chain for one call
//!
//! ## Example
//!
//! ```
//! use http::Method;
//! use weave_core::prelude::*;
//!
//! let mut dispatcher = Dispatcher::default();
//! dispatcher
//!     .aspects()
//!     .register("/api/**", 50, |ctx, next| {
//!         if ctx.request().query("token").is_none() {
//!             return Err(RuntimeError::new(401, "token required").into());
//!         }
//!         next.run(ctx)
//!     })
//!     .unwrap();
//!
//! let op = dispatcher
//!     .register(OperationDescriptor::get("/api/hello").param("name"), |name: String| {
//!         Ok(Json(format!("hello {name}")))
//!     })
//!     .unwrap();
//!
//! let denied = dispatcher
//!     .dispatch(&op, Request::new(Method::GET, "/api/hello?name=ann"))
//!     .unwrap();
//! assert_eq!(denied.status, 401);
//!
//! let ok = dispatcher
//!     .dispatch(&op, Request::new(Method::GET, "/api/hello?name=ann&token=t"))
//!     .unwrap();
//! assert_eq!(ok.text(), r#""hello ann""#);
//! ```

pub mod aspect;
pub mod aspects;
pub mod common;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod operation;
pub mod param;
pub mod pattern;
pub mod pipeline;
pub mod request;
pub mod transaction;
pub mod validation;

pub use error::{DispatchError, RegistrationError, Result};

/// Commonly used types.
pub mod prelude {
    pub use crate::aspect::{Aspect, AspectRegistry, Next};
    pub use crate::aspects::{ErrorMappingAspect, LoggingAspect};
    pub use crate::common::{CommonParamRegistry, CommonParams};
    pub use crate::config::EngineConfig;
    pub use crate::context::ExecutionContext;
    pub use crate::dispatch::{Controller, Dispatcher, Operation};
    pub use crate::error::{DispatchError, RegistrationError, RuntimeError, ValidationError};
    pub use crate::handler::{Handler, Json};
    pub use crate::operation::{ControllerDescriptor, OperationDescriptor, ParamSource};
    pub use crate::param::{Param, Record};
    pub use crate::request::{Request, RequestHandle, Response, ResponseHandle};
    pub use crate::transaction::{Transaction, TransactionDriver, Tx};
    pub use crate::validation::{FieldRules, Validate, ValidationContext};
}
