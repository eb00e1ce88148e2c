//! Transactions
//!
//! A [`Transaction`] owns the inline blob cache for blobs fetched under it.
//! The cache lives in the session so fetch decoding can fill it; commit and
//! rollback discard it.

use tracing::debug;

use crate::blob::{BlobDirection, BlobId, BlobRef};
use crate::codec::ParameterBuffer;
use crate::constants::{tpb, Operation};
use crate::error::{Error, Result};
use crate::events::{Listeners, TransactionEvent};
use crate::messages::handle_request;
use crate::session::Session;

/// Isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Snapshot (concurrency)
    Snapshot,
    /// Snapshot with table locks (consistency)
    SnapshotTableStability,
    /// Read committed
    ReadCommitted {
        /// Read the latest committed version instead of waiting
        record_version: bool,
    },
    /// Read committed with statement-level read consistency
    ReadConsistency,
}

/// Behaviour on lock conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// Wait indefinitely
    Wait,
    /// Fail immediately
    NoWait,
    /// Wait up to the given number of seconds
    Timeout(u16),
}

/// Options of a new transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Isolation level
    pub isolation: IsolationLevel,
    /// Read-only transaction
    pub read_only: bool,
    /// Lock conflict behaviour
    pub wait: LockWait,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted {
                record_version: true,
            },
            read_only: false,
            wait: LockWait::Wait,
        }
    }
}

impl TransactionOptions {
    /// Set the isolation level
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Make the transaction read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the lock conflict behaviour
    pub fn wait(mut self, wait: LockWait) -> Self {
        self.wait = wait;
        self
    }

    /// Encode as a transaction parameter buffer
    pub fn tpb(&self) -> Vec<u8> {
        let mut pb = ParameterBuffer::new(tpb::VERSION3);
        match self.isolation {
            IsolationLevel::Snapshot => {
                pb.push_tag(tpb::CONCURRENCY);
            }
            IsolationLevel::SnapshotTableStability => {
                pb.push_tag(tpb::CONSISTENCY);
            }
            IsolationLevel::ReadCommitted { record_version } => {
                pb.push_tag(tpb::READ_COMMITTED).push_tag(if record_version {
                    tpb::REC_VERSION
                } else {
                    tpb::NO_REC_VERSION
                });
            }
            IsolationLevel::ReadConsistency => {
                pb.push_tag(tpb::READ_COMMITTED).push_tag(tpb::READ_CONSISTENCY);
            }
        }
        pb.push_tag(if self.read_only { tpb::READ } else { tpb::WRITE });
        match self.wait {
            LockWait::Wait => {
                pb.push_tag(tpb::WAIT);
            }
            LockWait::NoWait => {
                pb.push_tag(tpb::NOWAIT);
            }
            LockWait::Timeout(secs) => {
                pb.push_tag(tpb::WAIT).push_int(tpb::LOCK_TIMEOUT, i32::from(secs));
            }
        }
        pb.into_bytes()
    }
}

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open
    Active,
    /// Committed
    Committed,
    /// Rolled back
    RolledBack,
}

/// A server transaction
#[derive(Debug)]
pub struct Transaction {
    session: Session,
    handle: i32,
    state: TransactionState,
    listeners: Listeners<TransactionEvent>,
}

impl Transaction {
    pub(crate) fn new(session: Session, handle: i32) -> Self {
        debug!(session = session.id(), transaction = handle, "transaction started");
        session.transaction_listeners().emit(&TransactionEvent::Started);
        Self {
            session,
            handle,
            state: TransactionState::Active,
            listeners: Listeners::new(),
        }
    }

    fn emit(&self, event: TransactionEvent) {
        self.listeners.emit(&event);
        self.session.transaction_listeners().emit(&event);
    }

    /// Server handle
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the transaction is still open
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Listeners for this transaction's events
    ///
    /// `Started` is only seen by [`Session::transaction_listeners`].
    pub fn listeners(&self) -> &Listeners<TransactionEvent> {
        &self.listeners
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    /// Handle to an existing blob
    pub fn blob(&self, id: BlobId) -> Result<BlobRef> {
        self.ensure_active()?;
        Ok(BlobRef::new(self.session.clone(), self.handle, id, BlobDirection::Input))
    }

    /// Handle to a new blob; its id is assigned when it is opened
    pub fn create_blob(&self) -> Result<BlobRef> {
        self.ensure_active()?;
        Ok(BlobRef::new(
            self.session.clone(),
            self.handle,
            BlobId::default(),
            BlobDirection::Output,
        ))
    }

    /// Commit and end the transaction
    pub async fn commit(&mut self) -> Result<()> {
        self.finish(Operation::Commit).await
    }

    /// Roll back and end the transaction
    pub async fn rollback(&mut self) -> Result<()> {
        self.finish(Operation::Rollback).await
    }

    /// Commit, keeping the transaction open
    pub async fn commit_retaining(&mut self) -> Result<()> {
        self.retain(Operation::CommitRetaining).await
    }

    /// Roll back, keeping the transaction open
    pub async fn rollback_retaining(&mut self) -> Result<()> {
        self.retain(Operation::RollbackRetaining).await
    }

    async fn finish(&mut self, op: Operation) -> Result<()> {
        self.ensure_active()?;
        let mut wire = self.session.wire(None).await?;
        wire.call(handle_request(op, self.handle)).await?;
        wire.discard_blob_cache(self.handle);
        drop(wire);

        let event = if op == Operation::Commit {
            self.state = TransactionState::Committed;
            TransactionEvent::Committed { retaining: false }
        } else {
            self.state = TransactionState::RolledBack;
            TransactionEvent::RolledBack { retaining: false }
        };
        debug!(transaction = self.handle, state = ?self.state, "transaction ended");
        self.emit(event);
        self.listeners.clear();
        Ok(())
    }

    async fn retain(&mut self, op: Operation) -> Result<()> {
        self.ensure_active()?;
        let mut wire = self.session.wire(None).await?;
        wire.call(handle_request(op, self.handle)).await?;
        drop(wire);
        let event = if op == Operation::CommitRetaining {
            TransactionEvent::Committed { retaining: true }
        } else {
            TransactionEvent::RolledBack { retaining: true }
        };
        self.emit(event);
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            debug!(transaction = self.handle, "transaction dropped while active");
            self.session.release_blob_cache(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tpb() {
        assert_eq!(
            TransactionOptions::default().tpb(),
            vec![
                tpb::VERSION3,
                tpb::READ_COMMITTED,
                tpb::REC_VERSION,
                tpb::WRITE,
                tpb::WAIT
            ]
        );
    }

    #[test]
    fn test_snapshot_read_only_lock_timeout() {
        let tpb_bytes = TransactionOptions::default()
            .isolation(IsolationLevel::Snapshot)
            .read_only(true)
            .wait(LockWait::Timeout(5))
            .tpb();
        assert_eq!(
            tpb_bytes,
            vec![
                tpb::VERSION3,
                tpb::CONCURRENCY,
                tpb::READ,
                tpb::WAIT,
                tpb::LOCK_TIMEOUT,
                4,
                5,
                0,
                0,
                0
            ]
        );
    }

    #[test]
    fn test_nowait_consistency() {
        let tpb_bytes = TransactionOptions::default()
            .isolation(IsolationLevel::SnapshotTableStability)
            .wait(LockWait::NoWait)
            .tpb();
        assert_eq!(tpb_bytes, vec![tpb::VERSION3, tpb::CONSISTENCY, tpb::WRITE, tpb::NOWAIT]);
    }
}
