//! # Weave Testing
//!
//! Testing utilities and helpers for Weave.
//!
//! This crate provides:
//! - A mock transaction driver with call counters and switchable failures
//! - A call log for asserting the order aspects and handlers ran in
//! - Request builders
//! - Property-based testing strategies for paths
//!
//! ## Example
//!
//! ```
//! use weave_core::prelude::*;
//! use weave_testing::helpers::get;
//! use weave_testing::mocks::{MockTransaction, MockTransactionDriver};
//!
//! let driver = MockTransactionDriver::new();
//! let mut dispatcher = Dispatcher::default();
//! dispatcher.install_transactions(driver.clone());
//!
//! let op = dispatcher
//!     .register(OperationDescriptor::post("/items").transactional(), |tx: Tx<MockTransaction>| {
//!         tx.with(|t| t.execute("INSERT INTO items"))
//!     })
//!     .unwrap();
//! dispatcher.dispatch(&op, weave_testing::helpers::post_body("/items", "")).unwrap();
//!
//! assert_eq!(driver.commits(), 1);
//! assert_eq!(driver.committed(), ["INSERT INTO items"]);
//! # let _ = get("/");
//! ```

/// Mock implementations of external collaborators.
pub mod mocks {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use weave_core::transaction::{Transaction, TransactionDriver};

    /// Failure injected by the mock driver.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("mock driver failure: {0}")]
    pub struct MockError(pub &'static str);

    #[derive(Debug, Default)]
    struct Shared {
        begun: AtomicUsize,
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
        fail_begin: AtomicBool,
        fail_commit: AtomicBool,
        fail_rollback: AtomicBool,
        committed: Mutex<Vec<String>>,
    }

    /// In-memory transaction driver.
    ///
    /// Clones share counters and switches, so a test keeps one clone while
    /// the dispatcher owns another.
    ///
    /// # Example
    ///
    /// ```
    /// use weave_core::transaction::{Transaction, TransactionDriver};
    /// use weave_testing::mocks::MockTransactionDriver;
    ///
    /// let driver = MockTransactionDriver::new();
    /// let mut tx = driver.begin().unwrap();
    /// tx.execute("UPDATE t SET x = 1");
    /// tx.rollback().unwrap();
    ///
    /// assert_eq!(driver.begun(), 1);
    /// assert_eq!(driver.rollbacks(), 1);
    /// assert!(driver.committed().is_empty());
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct MockTransactionDriver {
        shared: Arc<Shared>,
    }

    impl MockTransactionDriver {
        /// Create a driver that succeeds at everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `begin` fail from now on (or succeed again).
        pub fn fail_begin(&self, fail: bool) {
            self.shared.fail_begin.store(fail, Ordering::SeqCst);
        }

        /// Make `commit` fail from now on (or succeed again).
        pub fn fail_commit(&self, fail: bool) {
            self.shared.fail_commit.store(fail, Ordering::SeqCst);
        }

        /// Make `rollback` fail from now on (or succeed again).
        pub fn fail_rollback(&self, fail: bool) {
            self.shared.fail_rollback.store(fail, Ordering::SeqCst);
        }

        /// Number of transactions opened.
        #[must_use]
        pub fn begun(&self) -> usize {
            self.shared.begun.load(Ordering::SeqCst)
        }

        /// Number of commit calls.
        #[must_use]
        pub fn commits(&self) -> usize {
            self.shared.commits.load(Ordering::SeqCst)
        }

        /// Number of rollback calls.
        #[must_use]
        pub fn rollbacks(&self) -> usize {
            self.shared.rollbacks.load(Ordering::SeqCst)
        }

        /// Statements of every successfully committed transaction, in order.
        #[must_use]
        pub fn committed(&self) -> Vec<String> {
            self.shared
                .committed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl TransactionDriver for MockTransactionDriver {
        type Transaction = MockTransaction;
        type Error = MockError;

        fn begin(&self) -> Result<MockTransaction, MockError> {
            if self.shared.fail_begin.load(Ordering::SeqCst) {
                return Err(MockError("begin"));
            }
            self.shared.begun.fetch_add(1, Ordering::SeqCst);
            Ok(MockTransaction {
                statements: Vec::new(),
                shared: Arc::clone(&self.shared),
            })
        }
    }

    /// Transaction opened by [`MockTransactionDriver`].
    #[derive(Debug)]
    pub struct MockTransaction {
        statements: Vec<String>,
        shared: Arc<Shared>,
    }

    impl MockTransaction {
        /// Record a statement.
        pub fn execute(&mut self, statement: impl Into<String>) {
            self.statements.push(statement.into());
        }

        /// Statements recorded so far.
        #[must_use]
        pub fn statements(&self) -> &[String] {
            &self.statements
        }
    }

    impl Transaction for MockTransaction {
        type Error = MockError;

        fn commit(self) -> Result<(), MockError> {
            self.shared.commits.fetch_add(1, Ordering::SeqCst);
            if self.shared.fail_commit.load(Ordering::SeqCst) {
                return Err(MockError("commit"));
            }
            self.shared
                .committed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(self.statements);
            Ok(())
        }

        fn rollback(self) -> Result<(), MockError> {
            self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.shared.fail_rollback.load(Ordering::SeqCst) {
                return Err(MockError("rollback"));
            }
            Ok(())
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use http::{HeaderMap, HeaderValue, Method, header};
    use serde::Serialize;
    use std::sync::{Arc, Mutex, PoisonError};
    use weave_core::request::Request;

    /// Ordered record of events, shareable between aspects, handlers and
    /// the test body.
    ///
    /// # Example
    ///
    /// ```
    /// use weave_testing::helpers::CallLog;
    ///
    /// let log = CallLog::new();
    /// let aspect_log = log.clone();
    /// aspect_log.record("outer:before");
    /// log.record("handler");
    /// assert_eq!(log.entries(), ["outer:before", "handler"]);
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct CallLog {
        entries: Arc<Mutex<Vec<String>>>,
    }

    impl CallLog {
        /// Create an empty log.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append an event.
        pub fn record(&self, event: impl Into<String>) {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.into());
        }

        /// Snapshot of the events so far.
        #[must_use]
        pub fn entries(&self) -> Vec<String> {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of events equal to `event`.
        #[must_use]
        pub fn count(&self, event: &str) -> usize {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|e| *e == event)
                .count()
        }

        /// Number of events.
        #[must_use]
        pub fn len(&self) -> usize {
            self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing was recorded.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    /// GET request for `uri` (path plus optional query).
    #[must_use]
    pub fn get(uri: &str) -> Request {
        Request::new(Method::GET, uri)
    }

    /// DELETE request for `uri`.
    #[must_use]
    pub fn delete(uri: &str) -> Request {
        Request::new(Method::DELETE, uri)
    }

    /// POST request with a raw body.
    #[must_use]
    pub fn post_body(uri: &str, body: impl Into<Vec<u8>>) -> Request {
        Request::new(Method::POST, uri).with_body(body)
    }

    /// POST request with a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if `value` cannot be serialized, which only happens for types
    /// with failing `Serialize` implementations.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn post_json<T: Serialize + ?Sized>(uri: &str, value: &T) -> Request {
        let body = serde_json::to_vec(value).expect("test payload should serialize");
        with_content_type(Request::new(Method::POST, uri), "application/json").with_body(body)
    }

    /// POST request with a URL-encoded form body.
    ///
    /// # Panics
    ///
    /// Panics if `value` cannot be encoded as a flat form.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn post_form<T: Serialize + ?Sized>(uri: &str, value: &T) -> Request {
        let body = serde_urlencoded::to_string(value).expect("test form should encode");
        with_content_type(
            Request::new(Method::POST, uri),
            "application/x-www-form-urlencoded",
        )
        .with_body(body)
    }

    fn with_content_type(request: Request, content_type: &'static str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        request.with_headers(headers)
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One path segment: lowercase letters, digits, `-` and `_`.
    pub fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9_-]{1,12}"
    }

    /// An absolute path of one to `max_segments` segments.
    pub fn path(max_segments: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..=max_segments.max(1))
            .prop_map(|segments| format!("/{}", segments.join("/")))
    }
}

/// Install a test-friendly tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
