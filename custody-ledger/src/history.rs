//! History view
//!
//! Display-ready projection of an owner's locks. Every snapshot is
//! reconciled against the current time through the owner's actor, so any
//! lock that matured since the last read is persisted as `unlocked` before
//! the snapshot is handed out. Filtering and aggregation are pure functions
//! over the snapshot.

use crate::actor::OwnerRouter;
use crate::types::{Asset, Lock, LockStatus, Owner, Timestamp};
use crate::Result;
use rust_decimal::Decimal;
use serde::Serialize;

/// Reconciled locks of one owner, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Owner
    pub owner: Owner,

    /// Time the snapshot was reconciled against
    pub taken_at: Timestamp,

    /// Locks, newest first
    pub locks: Vec<Lock>,
}

impl Snapshot {
    /// Build from locks in creation order
    pub fn from_creation_order(owner: Owner, taken_at: Timestamp, mut locks: Vec<Lock>) -> Self {
        locks.reverse();
        Self {
            owner,
            taken_at,
            locks,
        }
    }

    /// Locks matching `filter`
    pub fn filter(&self, filter: &LockFilter) -> Vec<&Lock> {
        self.locks.iter().filter(|lock| filter.matches(lock)).collect()
    }

    /// Aggregates over all locks
    pub fn summary(&self) -> LockSummary {
        LockSummary::from_locks(&self.locks)
    }

    /// The `n` most recent locks
    pub fn recent(&self, n: usize) -> &[Lock] {
        &self.locks[..n.min(self.locks.len())]
    }

    /// Locks that can be withdrawn right now
    pub fn withdrawable(&self) -> Vec<&Lock> {
        self.filter(&LockFilter::new().with_status(LockStatus::Unlocked))
    }
}

/// Conjunction of optional predicates; an empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFilter {
    /// Exact status
    pub status: Option<LockStatus>,

    /// Exact asset tag
    pub asset: Option<Asset>,

    /// Substring of the lock id (case-insensitive) or of the amount
    pub search: Option<String>,
}

impl LockFilter {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a status
    pub fn with_status(mut self, status: LockStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to an asset
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Restrict to a search term
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Check one lock
    pub fn matches(&self, lock: &Lock) -> bool {
        if self.status.map_or(false, |status| lock.status != status) {
            return false;
        }
        if self.asset.map_or(false, |asset| lock.asset != asset) {
            return false;
        }
        match self.search.as_deref() {
            None | Some("") => true,
            Some(term) => {
                lock.amount.to_string().contains(term)
                    || lock.id.to_string().contains(&term.to_lowercase())
            }
        }
    }
}

/// Aggregates shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSummary {
    /// Sum of `locked` amounts
    #[serde(with = "rust_decimal::serde::str")]
    pub total_locked: Decimal,

    /// Sum of `unlocked` amounts
    #[serde(with = "rust_decimal::serde::str")]
    pub total_withdrawable: Decimal,

    /// Sum of `withdrawn` amounts
    #[serde(with = "rust_decimal::serde::str")]
    pub total_withdrawn: Decimal,

    /// Number of `locked` locks
    pub active_count: usize,

    /// Number of locks of any status
    pub total_count: usize,
}

impl LockSummary {
    /// Aggregate a set of locks
    pub fn from_locks<'a>(locks: impl IntoIterator<Item = &'a Lock>) -> Self {
        locks.into_iter().fold(Self::default(), |mut summary, lock| {
            match lock.status {
                LockStatus::Locked => {
                    summary.total_locked += lock.amount;
                    summary.active_count += 1;
                }
                LockStatus::Unlocked => summary.total_withdrawable += lock.amount,
                LockStatus::Withdrawn => summary.total_withdrawn += lock.amount,
            }
            summary.total_count += 1;
            summary
        })
    }
}

/// Read side of the ledger
#[derive(Clone)]
pub struct HistoryView {
    router: OwnerRouter,
}

impl HistoryView {
    /// Create over the owner router
    pub fn new(router: OwnerRouter) -> Self {
        Self { router }
    }

    /// Reconciled snapshot of `owner`'s locks, newest first
    pub async fn snapshot(&self, owner: &Owner) -> Result<Snapshot> {
        let locks = self.router.handle(owner).reconcile().await?;
        let taken_at = self.router.now();

        tracing::debug!(owner = %owner, count = locks.len(), "Snapshot taken");
        Ok(Snapshot::from_creation_order(owner.clone(), taken_at, locks))
    }

    /// Aggregates over a fresh snapshot
    pub async fn summary(&self, owner: &Owner) -> Result<LockSummary> {
        Ok(self.snapshot(owner).await?.summary())
    }
}
