//! Axum integration for the Weave dispatch engine.
//!
//! This crate is the imperative shell around `weave-core`: it turns HTTP
//! requests into core requests, runs the synchronous dispatch chain on the
//! blocking pool, and turns the outcome back into HTTP.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at the route mounted for the operation path
//! 2. **Select** the operation for the request method (405 if none)
//! 3. **Buffer** the body up to the configured limit (413 beyond it)
//! 4. **Dispatch** through the aspect chain on a blocking thread
//! 5. **Write** the core response, or map an uncaught failure to [`AppError`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weave_core::prelude::*;
//! use weave_web::{WebConfig, router};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut dispatcher = Dispatcher::default();
//! dispatcher.register(OperationDescriptor::get("/ping"), || Ok(Json("pong")))?;
//!
//! let app = router(Arc::new(dispatcher), &WebConfig::default());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod router;

// Re-export key types for convenience
pub use config::{ShadowConfig, WebConfig};
pub use error::AppError;
pub use middleware::ShadowLayer;
pub use router::router;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
