//! Listener registries for session, statement and transaction events
//!
//! Each owner carries a [`Listeners`] registry. Callbacks run synchronously on
//! the task that raised the event, after the session lock is released where
//! possible; they must not block. Registries are cleared when their owner is
//! torn down.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ServerError;

/// Handle returned by [`Listeners::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of event callbacks
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Listeners<E> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(ListenerId, Callback<E>)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(eid, _)| *eid != id);
        entries.len() != before
    }

    /// Remove every callback
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every callback
    pub fn emit(&self, event: &E) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<Callback<E>> = self.entries().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            cb(event);
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Events raised by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Server warning attached to a successful response
    Warning(ServerError),
    /// Session detached or broken
    Closed,
}

/// Statement lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Not yet allocated on the server
    New,
    /// Handle allocated
    Allocated,
    /// Prepare request in flight
    Preparing,
    /// Prepared, no open cursor
    Prepared,
    /// Execute request in flight
    Executing,
    /// Result set open
    CursorOpen,
    /// Last operation failed; only prepare leaves this state
    Error,
    /// Handle released
    Freed,
}

/// Events raised by a statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementEvent {
    /// State transition
    StateChanged {
        /// Previous state
        from: StatementState,
        /// New state
        to: StatementState,
    },
    /// A fetch completed, possibly with zero rows
    FetchCompleted {
        /// Rows added to the buffer
        rows: usize,
    },
    /// The cursor reached its end; raised once per open cursor
    EndOfCursor,
    /// Server warning
    Warning(ServerError),
}

/// Events raised by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    /// Transaction started
    Started,
    /// Transaction committed (or commit-retained)
    Committed {
        /// Whether the transaction stays active
        retaining: bool,
    },
    /// Transaction rolled back (or rollback-retained)
    RolledBack {
        /// Whether the transaction stays active
        retaining: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let listeners: Listeners<StatementEvent> = Listeners::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let id = listeners.subscribe(move |event| {
            if let StatementEvent::FetchCompleted { rows } = event {
                counter.fetch_add(*rows, Ordering::SeqCst);
            }
        });

        listeners.emit(&StatementEvent::FetchCompleted { rows: 3 });
        listeners.emit(&StatementEvent::EndOfCursor);
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.emit(&StatementEvent::FetchCompleted { rows: 5 });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clear() {
        let listeners: Listeners<SessionEvent> = Listeners::default();
        listeners.subscribe(|_| {});
        listeners.subscribe(|_| {});
        assert_eq!(listeners.len(), 2);
        listeners.clear();
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_callback_may_subscribe() {
        let listeners: Arc<Listeners<TransactionEvent>> = Arc::new(Listeners::new());
        let inner = listeners.clone();
        listeners.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        listeners.emit(&TransactionEvent::Started);
        assert_eq!(listeners.len(), 2);
    }
}
