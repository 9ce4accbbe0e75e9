//! Engine configuration.

use crate::aspects::ERROR_MAPPING_PRIORITY;
use crate::transaction::TRANSACTION_PRIORITY;

/// Settings shared by every dispatch.
///
/// # Example
///
/// ```
/// use weave_core::config::EngineConfig;
///
/// let config = EngineConfig::new()
///     .with_sequence_delimiter(';')
///     .with_error_mapping(false);
/// assert_eq!(config.sequence_delimiter, ';');
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Separator for sequence parameters read from a single value.
    pub sequence_delimiter: char,
    /// Priority of the built-in transaction aspect.
    pub transaction_priority: i32,
    /// Whether the error-mapping aspect is installed.
    pub error_mapping: bool,
    /// Priority of the error-mapping aspect.
    pub error_mapping_priority: i32,
}

impl EngineConfig {
    /// Default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sequence_delimiter: ',',
            transaction_priority: TRANSACTION_PRIORITY,
            error_mapping: true,
            error_mapping_priority: ERROR_MAPPING_PRIORITY,
        }
    }

    /// Set the sequence delimiter.
    #[must_use]
    pub const fn with_sequence_delimiter(mut self, delimiter: char) -> Self {
        self.sequence_delimiter = delimiter;
        self
    }

    /// Set the transaction aspect priority.
    #[must_use]
    pub const fn with_transaction_priority(mut self, priority: i32) -> Self {
        self.transaction_priority = priority;
        self
    }

    /// Enable or disable the error-mapping aspect.
    #[must_use]
    pub const fn with_error_mapping(mut self, enabled: bool) -> Self {
        self.error_mapping = enabled;
        self
    }

    /// Set the error-mapping aspect priority.
    #[must_use]
    pub const fn with_error_mapping_priority(mut self, priority: i32) -> Self {
        self.error_mapping_priority = priority;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
