//! Todo service demonstrating the Weave dispatch engine.
//!
//! This example shows how to build a small HTTP service with Weave. It
//! demonstrates:
//!
//! - A transactional controller backed by an in-memory store
//! - Record parameters with declarative validation
//! - A common parameter injected from a request header
//! - Closure and struct aspects at different priorities
//!
//! # Quick Start
//!
//! ```
//! use weave_core::prelude::*;
//! use weave_demo_todo::{api, store::TodoStore};
//!
//! let store = TodoStore::new();
//! let mut dispatcher = Dispatcher::default();
//! api::install(&mut dispatcher, store.clone()).unwrap();
//!
//! let create = dispatcher
//!     .find(&http::Method::POST, "/todos/items")
//!     .cloned()
//!     .unwrap();
//! let request = Request::new(http::Method::POST, "/todos/items")
//!     .with_body(r#"{"title":"Buy milk"}"#);
//! let response = dispatcher.dispatch(&create, request).unwrap();
//!
//! assert_eq!(response.status, 200);
//! assert_eq!(store.len(), 1);
//! ```

pub mod api;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use store::{StoreError, TodoStore, TodoTransaction};
pub use types::{NewTodo, TodoId, TodoItem};
