//! Transaction correlation table
//!
//! Maps an outstanding transaction id to the ordered list of items covered
//! by that service call. Created when a batch is dispatched, erased when
//! the matching completion retires it.
//!
//! The tracker has no locking policy of its own; the session holds one
//! lock around id allocation, register and retire, so a completion cannot
//! race a new registration that reuses an id.

use crate::item::Item;
use std::collections::HashMap;
use std::sync::Arc;

/// Outstanding service call bookkeeping
#[derive(Default)]
pub struct TransactionTracker {
    outstanding: HashMap<u32, Vec<Arc<Item>>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the items of a dispatched service call
    pub fn register(&mut self, transaction_id: u32, items: Vec<Arc<Item>>) {
        self.outstanding.insert(transaction_id, items);
    }

    /// Retire a transaction, returning its items in submission order
    ///
    /// Returns `None` for an unknown id; the caller logs and drops the
    /// completion.
    pub fn retire(&mut self, transaction_id: u32) -> Option<Vec<Arc<Item>>> {
        self.outstanding.remove(&transaction_id)
    }

    /// Drop every outstanding transaction (connection loss)
    pub fn clear(&mut self) {
        self.outstanding.clear();
    }

    /// Number of outstanding transactions
    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
