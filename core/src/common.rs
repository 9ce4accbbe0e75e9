//! Common-parameter suppliers.
//!
//! A supplier produces name → value overrides for every operation whose
//! path matches its pattern. When an override exists for a parameter's name,
//! the parameter pipeline uses it instead of reading the request.

use crate::error::RegistrationError;
use crate::pattern::Pattern;
use crate::request::Request;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Overrides produced by one supplier.
pub type CommonParams = HashMap<String, Value>;

type Supplier = dyn Fn(&Request) -> CommonParams + Send + Sync;

struct SupplierDefinition {
    pattern: Pattern,
    supplier: Box<Supplier>,
}

/// Registry of common-parameter suppliers, kept in registration order.
pub struct CommonParamRegistry {
    suppliers: ArcSwap<Vec<Arc<SupplierDefinition>>>,
}

impl CommonParamRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            suppliers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register a supplier for operations matching `pattern`.
    ///
    /// Overrides go through the same validation as values read from the
    /// request: a record override that breaks its field rules fails the
    /// call with a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] if `pattern` does not
    /// compile; nothing is registered in that case.
    pub fn register<F>(&self, pattern: &str, supplier: F) -> Result<(), RegistrationError>
    where
        F: Fn(&Request) -> CommonParams + Send + Sync + 'static,
    {
        let definition = Arc::new(SupplierDefinition {
            pattern: Pattern::compile(pattern)?,
            supplier: Box::new(supplier),
        });

        tracing::debug!(pattern = %definition.pattern, "Registering common parameters");

        self.suppliers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&definition));
            next
        });
        Ok(())
    }

    /// Merge the overrides of every supplier matching `path`.
    ///
    /// Suppliers run in registration order; a later supplier overwrites an
    /// earlier one on a name collision.
    #[must_use]
    pub fn resolve(&self, path: &str, request: &Request) -> CommonParams {
        let snapshot = self.suppliers.load();
        let mut merged = CommonParams::new();
        for definition in snapshot.iter().filter(|d| d.pattern.matches(path)) {
            merged.extend((definition.supplier)(request));
        }
        merged
    }

    /// Number of registered suppliers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.suppliers.load().len()
    }

    /// Whether no supplier is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suppliers.load().is_empty()
    }
}

impl Default for CommonParamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommonParamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.suppliers.load().iter().map(|d| d.pattern.as_str()))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_later_supplier_wins() {
        let registry = CommonParamRegistry::new();
        registry
            .register("/**", |_| CommonParams::from([("token".into(), json!("first"))]))
            .unwrap();
        registry
            .register("/api/*", |_| CommonParams::from([("token".into(), json!("second"))]))
            .unwrap();

        let request = Request::new(Method::GET, "/api/test");
        let merged = registry.resolve("/api/test", &request);
        assert_eq!(merged["token"], json!("second"));

        let merged = registry.resolve("/other", &request);
        assert_eq!(merged["token"], json!("first"));
    }

    #[test]
    fn test_supplier_sees_request() {
        let registry = CommonParamRegistry::new();
        registry
            .register("/**", |req| {
                let user = req.query("user").unwrap_or("anonymous").to_string();
                CommonParams::from([("user".into(), Value::String(user))])
            })
            .unwrap();

        let request = Request::new(Method::GET, "/a?user=ann");
        assert_eq!(registry.resolve("/a", &request)["user"], json!("ann"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let registry = CommonParamRegistry::new();
        assert!(registry.register("(", |_| CommonParams::new()).is_err());
        assert!(registry.is_empty());
    }
}
