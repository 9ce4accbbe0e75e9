//! Operation and controller descriptors.
//!
//! An [`OperationDescriptor`] describes one externally invokable unit: its
//! path, method, whether it runs inside a transaction, and where each of its
//! parameters comes from. Descriptors are built with ordinary code and are
//! immutable once registered with the dispatcher.
//!
//! # Example
//!
//! ```
//! use weave_core::operation::{OperationDescriptor, ParamSource};
//!
//! let op = OperationDescriptor::post("/users")
//!     .param_from("user", ParamSource::Json)
//!     .transactional()
//!     .attribute("auth", "admin");
//!
//! assert!(op.transaction);
//! assert_eq!(op.parameters[0].name, "user");
//! ```

use http::Method;
use std::collections::BTreeMap;

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    /// URL query string.
    Query,
    /// JSON request body.
    Json,
    /// `application/x-www-form-urlencoded` body.
    Form,
    /// Body first, query as a fallback.
    Implicit,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Name used for extraction and for common-parameter overrides.
    pub name: String,
    /// Declared source.
    pub source: ParamSource,
}

impl ParamSpec {
    /// Create a parameter spec.
    #[must_use]
    pub fn new(name: impl Into<String>, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Default spec for the parameter at `index`: a synthetic `argsN` name
    /// and a source chosen by the method.
    #[must_use]
    pub fn synthetic(index: usize, read_only: bool) -> Self {
        Self::new(format!("args{index}"), default_source(read_only))
    }
}

const fn default_source(read_only: bool) -> ParamSource {
    if read_only {
        ParamSource::Query
    } else {
        ParamSource::Json
    }
}

/// Whether `method` reads without side effects. Parameters of read-only
/// operations default to the query string, all others to the JSON body.
#[must_use]
pub fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Description of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Operation path. Relative to the controller prefix until registration,
    /// fully resolved afterwards.
    pub path: String,
    /// HTTP method.
    pub method: Method,
    /// Whether the operation runs inside a transaction.
    pub transaction: bool,
    /// Ordered parameter specs, one per handler argument after registration.
    pub parameters: Vec<ParamSpec>,
    /// Free-form tags.
    pub attributes: BTreeMap<String, String>,
}

impl OperationDescriptor {
    /// Create a descriptor for `method` and `path`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            transaction: false,
            parameters: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// `GET` descriptor.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` descriptor.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` descriptor.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH` descriptor.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE` descriptor.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Declare the next parameter by name; the source defaults by method.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        let source = default_source(is_read_only(&self.method));
        self.parameters.push(ParamSpec::new(name, source));
        self
    }

    /// Declare the next parameter with an explicit source.
    #[must_use]
    pub fn param_from(mut self, name: impl Into<String>, source: ParamSource) -> Self {
        self.parameters.push(ParamSpec::new(name, source));
        self
    }

    /// Run the operation inside a transaction.
    #[must_use]
    pub const fn transactional(mut self) -> Self {
        self.transaction = true;
        self
    }

    /// Attach a free-form tag.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a tag.
    #[must_use]
    pub fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Fill missing trailing parameter specs for a handler of `arity`
    /// arguments with synthetic ones.
    pub(crate) fn finalize(&mut self, arity: usize) {
        let read_only = is_read_only(&self.method);
        for index in self.parameters.len()..arity {
            self.parameters.push(ParamSpec::synthetic(index, read_only));
        }
    }
}

/// Description of the controller an operation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControllerDescriptor {
    /// Controller name, used in logs.
    pub name: String,
    /// Mount prefix shared by every operation of the controller.
    pub path: String,
    /// Run every operation of the controller inside a transaction.
    pub transaction: bool,
}

impl ControllerDescriptor {
    /// Create a controller descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            transaction: false,
        }
    }

    /// Full path of an operation mounted under this controller.
    ///
    /// Joins prefix and path with a `/` when the path does not start with one,
    /// then collapses any `//`.
    #[must_use]
    pub fn full_path(&self, path: &str) -> String {
        let mut full = self.path.clone();
        if !path.starts_with('/') {
            full.push('/');
        }
        full.push_str(path);
        while full.contains("//") {
            full = full.replace("//", "/");
        }
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_fills_synthetic_params_for_get() {
        let mut op = OperationDescriptor::get("/test").param("a");
        op.finalize(3);

        assert_eq!(op.parameters.len(), 3);
        assert_eq!(op.parameters[0], ParamSpec::new("a", ParamSource::Query));
        assert_eq!(op.parameters[1], ParamSpec::new("args1", ParamSource::Query));
        assert_eq!(op.parameters[2], ParamSpec::new("args2", ParamSource::Query));
    }

    #[test]
    fn test_finalize_defaults_to_json_for_writes() {
        let mut op = OperationDescriptor::post("/test").param("body");
        op.finalize(1);
        assert_eq!(op.parameters[0].source, ParamSource::Json);
    }

    #[test]
    fn test_explicit_source_survives_finalize() {
        let mut op = OperationDescriptor::post("/test").param_from("form", ParamSource::Form);
        op.finalize(1);
        assert_eq!(op.parameters[0].source, ParamSource::Form);
    }

    #[test]
    fn test_full_path_joins_and_collapses() {
        let controller = ControllerDescriptor::new("test", "/api/");
        assert_eq!(controller.full_path("/test"), "/api/test");
        assert_eq!(controller.full_path("test"), "/api/test");

        let root = ControllerDescriptor::new("root", "");
        assert_eq!(root.full_path("health"), "/health");
    }

    #[test]
    fn test_read_only_methods() {
        assert!(is_read_only(&Method::GET));
        assert!(is_read_only(&Method::HEAD));
        assert!(!is_read_only(&Method::DELETE));
        assert!(!is_read_only(&Method::POST));
    }

    #[test]
    fn test_attributes() {
        let op = OperationDescriptor::get("/x").attribute("auth", "admin");
        assert_eq!(op.attribute_value("auth"), Some("admin"));
        assert_eq!(op.attribute_value("missing"), None);
    }
}
