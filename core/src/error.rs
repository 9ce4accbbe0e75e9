//! Error types for registration and dispatch.
//!
//! Failures travel up the aspect chain as ordinary `Result` values. Every
//! layer sees the error produced by the layers it wraps and decides whether
//! to convert it, observe it, or pass it on unchanged.

use std::fmt;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Accumulated validation failures for one parameter.
///
/// Produced only by the parameter pipeline. Messages keep the order in which
/// the rules and hooks reported them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    messages: Vec<String>,
}

impl ValidationError {
    /// Create a validation error from a list of messages.
    #[must_use]
    pub const fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    /// Create a validation error carrying a single message.
    #[must_use]
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// The human-readable messages, in reporting order.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Consume the error and return its messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no message was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Application-declared failure with a numeric code.
///
/// Handlers raise this to ask an outer aspect for a specific response
/// status; the core never interprets `code` itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// Application code, usually an HTTP status.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
}

impl RuntimeError {
    /// Create a new runtime error.
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Which step of a transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    /// Opening the transaction.
    Begin,
    /// Committing after a normal return.
    Commit,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// Failure propagated through the dispatch chain.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Parameter validation failed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The handler raised an application error.
    #[error("runtime error {}: {}", .0.code, .0.message)]
    Runtime(#[from] RuntimeError),

    /// The transaction driver failed.
    #[error("transaction {stage} failed: {source}")]
    Transaction {
        /// Step that failed
        stage: TransactionStage,
        /// Driver error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A resource parameter was requested but nothing provided it.
    #[error("no {0} is available for this call")]
    MissingResource(&'static str),

    /// An aspect replaced an argument with a value of the wrong type.
    #[error("argument {index} is not a {expected}")]
    ArgumentType {
        /// Position in the argument list
        index: usize,
        /// Type the handler declared
        expected: &'static str,
    },

    /// Any other failure raised by a handler or aspect.
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl DispatchError {
    /// Wrap a driver error for the given transaction stage.
    pub fn transaction(
        stage: TransactionStage,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transaction {
            stage,
            source: Box::new(source),
        }
    }

    /// Short name of the failure class, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Runtime(_) => "runtime",
            Self::Transaction { .. } => "transaction",
            Self::MissingResource(_) => "missing_resource",
            Self::ArgumentType { .. } => "argument_type",
            Self::Unclassified(_) => "unclassified",
        }
    }

    /// The validation error, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// The runtime error, if this is one.
    #[must_use]
    pub const fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure while registering aspects, suppliers or operations.
///
/// A failed registration leaves the target registry unchanged.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The pattern could not be compiled.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Pattern as written by the caller
        pattern: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },

    /// The descriptor declares more parameters than the handler accepts.
    #[error("operation {path} declares {declared} parameters but its handler accepts {accepted}")]
    ParameterMismatch {
        /// Full operation path
        path: String,
        /// Declared parameter count
        declared: usize,
        /// Handler arity
        accepted: usize,
    },

    /// An operation with the same method and path already exists.
    #[error("operation {method} {path} is already registered")]
    DuplicateOperation {
        /// HTTP method
        method: String,
        /// Full operation path
        path: String,
    },
}
