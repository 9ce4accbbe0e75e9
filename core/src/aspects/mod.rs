//! Built-in aspects.
//!
//! - [`ErrorMappingAspect`] turns validation and runtime failures into JSON
//!   responses.
//! - [`LoggingAspect`] traces entry, exit and failures of every matching
//!   operation.
//!
//! The transaction aspect lives in [`crate::transaction`].

mod error_mapping;
mod logging;

pub use error_mapping::{ERROR_MAPPING_PRIORITY, ErrorMappingAspect};
pub use logging::LoggingAspect;
