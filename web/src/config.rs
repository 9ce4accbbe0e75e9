//! Configuration for the HTTP boundary.

use std::collections::HashMap;
use std::path::PathBuf;

/// Default request body limit: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebConfig {
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
}

impl WebConfig {
    /// Default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Set the body limit.
    #[must_use]
    pub const fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shadow-traffic settings.
///
/// # Example
///
/// ```
/// use weave_web::config::ShadowConfig;
///
/// let config = ShadowConfig::new("/var/log/shadow")
///     .route("/api/v1/orders", "/api/v2/orders")
///     .with_base_url("http://127.0.0.1:8080");
/// assert_eq!(config.routes["/api/v1/orders"], "/api/v2/orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowConfig {
    /// Directory receiving one JSON file per differing response.
    pub log_dir: PathBuf,
    /// Original path to shadow path.
    pub routes: HashMap<String, String>,
    /// Replay target. Defaults to `http://{Host}` of the original request.
    pub base_url: Option<String>,
    /// Largest request body buffered for replay, in bytes. Larger requests
    /// still reach the handler but are not replayed.
    pub body_limit: usize,
}

impl ShadowConfig {
    /// Configuration writing diffs to `log_dir`, with no routes yet.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            routes: HashMap::new(),
            base_url: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Shadow requests for `original` to `shadow`.
    #[must_use]
    pub fn route(mut self, original: impl Into<String>, shadow: impl Into<String>) -> Self {
        self.routes.insert(original.into(), shadow.into());
        self
    }

    /// Replay against `base_url` instead of the original host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the body limit.
    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}
