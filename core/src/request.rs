//! Transport-neutral request and response handles.
//!
//! The boundary layer converts whatever its router hands it into a
//! [`Request`] before dispatch, and turns the [`Response`] an aspect wrote
//! (or the auto-returned result) back into its own response type.

use http::{HeaderMap, Method, StatusCode, header};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Inbound request as seen by the parameter pipeline.
#[derive(Debug, Default)]
pub struct Request {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    body: Vec<u8>,
    query_pairs: OnceLock<Vec<(String, String)>>,
    form_pairs: OnceLock<Vec<(String, String)>>,
}

impl Request {
    /// Create a request for `method` and a path that may carry a query
    /// string after `?`.
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            ..Self::default()
        }
    }

    /// Replace the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the body is a urlencoded form.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }

    /// Decoded query pairs, in order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        self.query_pairs
            .get_or_init(|| serde_urlencoded::from_str(&self.query).unwrap_or_default())
    }

    /// Decoded form pairs, in order. Empty unless the body is a form.
    pub fn form_pairs(&self) -> &[(String, String)] {
        self.form_pairs.get_or_init(|| {
            if self.is_form() {
                serde_urlencoded::from_bytes(&self.body).unwrap_or_default()
            } else {
                Vec::new()
            }
        })
    }

    /// First query value named `key`.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        lookup(self.query_pairs(), key)
    }

    /// First posted form value named `key`.
    #[must_use]
    pub fn form(&self, key: &str) -> Option<&str> {
        lookup(self.form_pairs(), key)
    }

    /// Single named value: posted form first, query second.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.form(key).or_else(|| self.query(key))
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Shared handle to the inbound request, usable as a handler parameter.
#[derive(Debug, Clone)]
pub struct RequestHandle(Arc<Request>);

impl RequestHandle {
    /// Wrap a request.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self(Arc::new(request))
    }
}

impl std::ops::Deref for RequestHandle {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.0
    }
}

/// Response written directly by an aspect or handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl Response {
    /// JSON response with the given status.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Empty response with the given status.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Body as UTF-8 text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared slot for a directly written response.
///
/// Empty until something writes to it. Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle(Arc<Mutex<Option<Response>>>);

impl ResponseHandle {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Response>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a response, replacing any earlier one.
    pub fn write(&self, response: Response) {
        *self.slot() = Some(response);
    }

    /// Write a JSON response.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be encoded; the slot is
    /// left unchanged in that case.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> serde_json::Result<()> {
        self.write(Response::json(status, value)?);
        Ok(())
    }

    /// Whether a response was written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.slot().is_some()
    }

    /// Take the written response, leaving the slot empty.
    #[must_use]
    pub fn take(&self) -> Option<Response> {
        self.slot().take()
    }
}
