//! Transaction aspect.
//!
//! Wraps transactional operations in a driver transaction: begin before the
//! rest of the chain runs, commit when it succeeds, roll back when it fails.
//! The open transaction is published on the side channel as a [`Tx`], which
//! handlers take as an ordinary parameter.
//!
//! # Example
//!
//! ```
//! use weave_core::transaction::{Transaction, TransactionDriver, Tx};
//!
//! #[derive(Debug)]
//! struct Session(Vec<String>);
//!
//! impl Transaction for Session {
//!     type Error = std::io::Error;
//!
//!     fn commit(self) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     fn rollback(self) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! struct Driver;
//!
//! impl TransactionDriver for Driver {
//!     type Transaction = Session;
//!     type Error = std::io::Error;
//!
//!     fn begin(&self) -> Result<Session, Self::Error> {
//!         Ok(Session(Vec::new()))
//!     }
//! }
//!
//! fn insert(tx: Tx<Session>, title: String) -> weave_core::Result<()> {
//!     tx.with(|session| session.0.push(title))
//! }
//! ```

use crate::aspect::{Aspect, Next};
use crate::context::ExecutionContext;
use crate::error::{DispatchError, Result, TransactionStage};
use crate::param::{Param, ResolveContext, Resolved};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Priority of the transaction aspect: below every default user aspect so
/// the transaction is innermost.
pub const TRANSACTION_PRIORITY: i32 = 0;

/// Pattern the transaction aspect is installed on.
pub const TRANSACTION_PATTERN: &str = "/**";

/// An open transaction.
pub trait Transaction: Send + 'static {
    /// Driver error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Make the transaction's work durable.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the commit fails.
    fn commit(self) -> std::result::Result<(), Self::Error>;

    /// Discard the transaction's work.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the rollback fails.
    fn rollback(self) -> std::result::Result<(), Self::Error>;
}

/// Source of transactions.
pub trait TransactionDriver: Send + Sync + 'static {
    /// Transactions this driver opens.
    type Transaction: Transaction;
    /// Error raised when a transaction cannot be opened.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if no transaction can be opened.
    fn begin(&self) -> std::result::Result<Self::Transaction, Self::Error>;
}

/// Handle to the transaction of the current call.
///
/// Clones share the transaction. Once the aspect commits or rolls back, the
/// handle is empty and [`Tx::with`] fails.
pub struct Tx<T>(Arc<Mutex<Option<T>>>);

impl<T> Tx<T> {
    /// Wrap an open transaction.
    #[must_use]
    pub fn new(transaction: T) -> Self {
        Self(Arc::new(Mutex::new(Some(transaction))))
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingResource`] if the transaction has
    /// already been finished.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slot = self.slot();
        let transaction = slot
            .as_mut()
            .ok_or(DispatchError::MissingResource("transaction"))?;
        Ok(f(transaction))
    }

    /// Whether the transaction is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    fn take(&self) -> Option<T> {
        self.slot().take()
    }
}

impl<T> Clone for Tx<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Tx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx").field("open", &self.is_open()).finish()
    }
}

impl<T: Transaction> Param for Tx<T> {
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        cx.side_channel
            .get::<Self>()
            .cloned()
            .map(Resolved::valid)
            .ok_or(DispatchError::MissingResource("transaction"))
    }
}

/// Aspect running transactional operations inside a driver transaction.
pub struct TransactionAspect<D> {
    driver: D,
}

impl<D: TransactionDriver> TransactionAspect<D> {
    /// Create the aspect over `driver`.
    #[must_use]
    pub const fn new(driver: D) -> Self {
        Self { driver }
    }

    fn finish(transaction: D::Transaction, outcome: &Result<()>) -> Result<()> {
        if outcome.is_ok() {
            return transaction
                .commit()
                .map_err(|err| DispatchError::transaction(TransactionStage::Commit, err));
        }

        // The original failure is what the caller sees; a failed rollback is
        // only logged.
        if let Err(err) = transaction.rollback() {
            tracing::error!(error = %err, "Transaction rollback failed");
        }
        Ok(())
    }
}

impl<D: TransactionDriver> Aspect for TransactionAspect<D> {
    fn around(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()> {
        if !ctx.is_transactional() {
            return next.run(ctx);
        }

        let transaction = self
            .driver
            .begin()
            .map_err(|err| DispatchError::transaction(TransactionStage::Begin, err))?;
        let handle = Tx::new(transaction);
        ctx.side_channel_mut().insert(handle.clone());
        tracing::debug!(operation = %ctx.operation().path, "Transaction started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| next.run(ctx)));
        ctx.side_channel_mut().remove::<Tx<D::Transaction>>();

        match outcome {
            Ok(result) => {
                if let Some(transaction) = handle.take() {
                    Self::finish(transaction, &result)?;
                }
                result
            }
            Err(payload) => {
                if let Some(transaction) = handle.take() {
                    if let Err(err) = transaction.rollback() {
                        tracing::error!(error = %err, "Transaction rollback failed");
                    }
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn name(&self) -> &str {
        "transaction"
    }
}

impl<D> fmt::Debug for TransactionAspect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionAspect").finish_non_exhaustive()
    }
}
