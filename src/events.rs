//! Subscriber lists and the events mining publishes to them.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::blockchain::Block;

pub type SubscriptionId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of callbacks invoked in subscription order.
///
/// Callbacks run on the notifying thread with no lock held, so a callback may
/// subscribe, unsubscribe or query the component that notified it.
pub struct Subscribers<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(sid, _)| *sid != id);
        callbacks.len() != before
    }

    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in snapshot {
            cb(value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What block subscribers of the mining engine receive.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    /// A candidate found by this engine was accepted by the ledger.
    Appended(Block),
    /// The remote ledger could not be reached or refused the candidate.
    SubmissionFailed {
        index: u64,
        hash: String,
        reason: String,
    },
    /// No template could be fetched; retried on the next telemetry tick.
    LedgerUnavailable { reason: String },
    /// No block was appended for `since_secs` while mining.
    Stalled { index: u64, since_secs: u64 },
    /// The session ended on its own; the coordinator is Idle again.
    Aborted { reason: String },
}
