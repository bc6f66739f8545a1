//! Lock-set change notifications
//!
//! Best-effort broadcast after every committed mutation. A subscriber that
//! falls behind loses events (`RecvError::Lagged`) and must re-read the
//! snapshot; nothing in the ledger depends on delivery.

use crate::types::{LockId, Owner};
use tokio::sync::broadcast;

/// Change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// New lock committed
    LockCreated {
        /// Funding owner
        owner: Owner,
        /// New lock
        lock_id: LockId,
    },

    /// Stored records moved from locked to unlocked
    LocksMatured {
        /// Owner of the locks
        owner: Owner,
        /// Number of records updated
        count: usize,
    },

    /// Lock withdrawn and balance credited
    LockWithdrawn {
        /// Credited owner
        owner: Owner,
        /// Withdrawn lock
        lock_id: LockId,
    },
}

impl LedgerEvent {
    /// Owner whose lock set changed
    pub fn owner(&self) -> &Owner {
        match self {
            LedgerEvent::LockCreated { owner, .. }
            | LedgerEvent::LocksMatured { owner, .. }
            | LedgerEvent::LockWithdrawn { owner, .. } => owner,
        }
    }
}

/// Sending side of the change channel
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<LedgerEvent>,
}

impl Notifier {
    /// Create channel buffering `capacity` events (must be non-zero)
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish; having no subscribers is not an error
    pub fn publish(&self, event: LedgerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for ledger event");
        }
    }

    /// New subscriber, receiving events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}
