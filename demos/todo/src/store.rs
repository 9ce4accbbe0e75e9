//! In-memory todo storage with transactional writes.
//!
//! [`TodoStore`] is the transaction driver installed on the dispatcher. A
//! [`TodoTransaction`] stages changes and applies them to the shared map
//! only on commit, so a failed call leaves the list untouched.

use crate::types::{TodoId, TodoItem};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use weave_core::transaction::{Transaction, TransactionDriver};

type Items = BTreeMap<TodoId, TodoItem>;

/// Failure raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store was closed for writes.
    #[error("todo store is read-only")]
    ReadOnly,
}

/// Shared todo list.
#[derive(Debug, Clone, Default)]
pub struct TodoStore {
    items: Arc<RwLock<Items>>,
    read_only: Arc<AtomicBool>,
}

impl TodoStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been committed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse (or accept again) new transactions.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Items {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TransactionDriver for TodoStore {
    type Transaction = TodoTransaction;
    type Error = StoreError;

    fn begin(&self) -> Result<TodoTransaction, StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }
        Ok(TodoTransaction {
            store: self.clone(),
            staged: Vec::new(),
        })
    }
}

#[derive(Debug)]
enum Change {
    Put(TodoItem),
    Remove(TodoId),
}

/// Unit of work over a [`TodoStore`].
#[derive(Debug)]
pub struct TodoTransaction {
    store: TodoStore,
    staged: Vec<Change>,
}

impl TodoTransaction {
    /// Items as this transaction sees them: committed state plus staged
    /// changes.
    #[must_use]
    pub fn items(&self) -> Vec<TodoItem> {
        let mut view = self.store.snapshot();
        apply(&mut view, &self.staged);
        view.into_values().collect()
    }

    /// One item, if present.
    #[must_use]
    pub fn get(&self, id: TodoId) -> Option<TodoItem> {
        self.items().into_iter().find(|item| item.id == id)
    }

    /// Insert or replace an item.
    pub fn put(&mut self, item: TodoItem) {
        self.staged.push(Change::Put(item));
    }

    /// Remove an item. Returns whether it existed.
    pub fn remove(&mut self, id: TodoId) -> bool {
        let existed = self.get(id).is_some();
        if existed {
            self.staged.push(Change::Remove(id));
        }
        existed
    }
}

impl Transaction for TodoTransaction {
    type Error = StoreError;

    fn commit(self) -> Result<(), StoreError> {
        let mut items = self
            .store
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut items, &self.staged);
        tracing::debug!(changes = self.staged.len(), "Todo transaction committed");
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        tracing::debug!(changes = self.staged.len(), "Todo transaction discarded");
        Ok(())
    }
}

fn apply(items: &mut Items, changes: &[Change]) {
    for change in changes {
        match change {
            Change::Put(item) => {
                items.insert(item.id, item.clone());
            }
            Change::Remove(id) => {
                items.remove(id);
            }
        }
    }
}
