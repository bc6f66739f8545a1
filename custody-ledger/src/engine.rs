//! Lock engine
//!
//! The only component that changes a lock's status or an owner's balance.
//!
//! # State machine
//!
//! ```text
//!   create_lock          now >= unlock_at            withdraw
//! ─────────────▶ Locked ──────────────────▶ Unlocked ──────────▶ Withdrawn
//!                        (lazy, on read)
//! ```
//!
//! Maturity is a pure predicate over `(lock, now)`. The stored status is
//! moved to `Unlocked` the first time the predicate is observed true.
//!
//! # Invariants
//!
//! - Conservation: balance + Σ(active lock amounts) only changes by seeding
//! - Status never moves backwards; `Withdrawn` is terminal
//! - At most one withdrawal per lock
//!
//! The engine assumes callers serialize operations per owner (see
//! [`crate::actor`]); the store offers no multi-key transactions beyond
//! [`LedgerStore::commit`].

use crate::{
    clock::Clock,
    metrics::Metrics,
    notify::{LedgerEvent, Notifier},
    storage::LedgerStore,
    types::{Lock, LockId, LockRequest, LockStatus, Owner, Timestamp, WithdrawalReceipt},
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Reconcile a lock's status with the current time
///
/// A `Locked` lock whose unlock time has been reached comes back
/// `Unlocked`; everything else is returned unchanged.
pub fn reconcile_status(lock: &Lock, now: Timestamp) -> Lock {
    let mut reconciled = lock.clone();
    if lock.status == LockStatus::Locked && lock.is_matured(now) {
        reconciled.status = LockStatus::Unlocked;
    }
    reconciled
}

/// Lock lifecycle and balance accounting
pub struct LockEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    metrics: Metrics,
}

impl std::fmt::Debug for LockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockEngine").finish_non_exhaustive()
    }
}

impl LockEngine {
    /// Create engine over a store and clock
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            metrics,
        }
    }

    /// Current time from the injected clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Change notifier
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Available balance of `owner`
    pub fn balance(&self, owner: &Owner) -> Result<Decimal> {
        self.store.get_balance(owner)
    }

    /// Whether `owner` already has a balance on the books
    pub fn is_seeded(&self, owner: &Owner) -> Result<bool> {
        self.store.has_balance(owner)
    }

    /// Initialize the balance of a new owner
    ///
    /// Does nothing if the owner was already seeded; returns the balance
    /// in effect afterwards.
    pub fn seed_balance(&self, owner: &Owner, balance: Decimal) -> Result<Decimal> {
        if self.store.has_balance(owner)? {
            return self.store.get_balance(owner);
        }
        if balance.is_sign_negative() {
            return Err(Error::Oracle(format!(
                "negative external balance {} for {}",
                balance, owner
            )));
        }

        self.store.set_balance(owner, balance)?;
        tracing::info!(owner = %owner, balance = %balance, "Owner balance seeded");
        Ok(balance)
    }

    /// Commit a new lock, moving `amount` out of the owner's balance
    pub fn create_lock(&self, owner: &Owner, request: LockRequest) -> Result<Lock> {
        let result = self.try_create_lock(owner, request);
        self.observe("create_lock", owner, result)
    }

    fn try_create_lock(&self, owner: &Owner, request: LockRequest) -> Result<Lock> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(request.amount));
        }

        let now = self.now();
        if request.unlock_at <= now {
            return Err(Error::InvalidSchedule {
                unlock_at: request.unlock_at,
                now,
            });
        }

        let available = self.store.get_balance(owner)?;
        if available < request.amount {
            return Err(Error::InsufficientFunds {
                available,
                requested: request.amount,
            });
        }

        let lock = Lock {
            id: LockId::generate(),
            owner: owner.clone(),
            amount: request.amount,
            asset: request.asset,
            created_at: now,
            unlock_at: request.unlock_at,
            recipient: request.recipient,
            status: LockStatus::Locked,
            withdrawn_at: None,
        };

        let balance_after = available - lock.amount;
        self.store.commit(owner, balance_after, &lock)?;

        tracing::info!(
            owner = %owner,
            lock_id = %lock.id,
            amount = %lock.amount,
            asset = %lock.asset,
            unlock_at = lock.unlock_at,
            balance = %balance_after,
            "Lock created"
        );

        self.metrics.record_lock_created();
        self.notifier.publish(LedgerEvent::LockCreated {
            owner: owner.clone(),
            lock_id: lock.id,
        });

        Ok(lock)
    }

    /// Reconcile every lock of `owner`, persisting newly matured records
    ///
    /// Returns the reconciled locks in creation order.
    pub fn reconcile_owner(&self, owner: &Owner) -> Result<Vec<Lock>> {
        let result = self.try_reconcile_owner(owner);
        self.observe("reconcile_owner", owner, result)
    }

    fn try_reconcile_owner(&self, owner: &Owner) -> Result<Vec<Lock>> {
        let now = self.now();
        let stored = self.store.list_locks(owner)?;

        let mut reconciled = Vec::with_capacity(stored.len());
        let mut matured = 0usize;

        for lock in &stored {
            let current = reconcile_status(lock, now);
            if current.status != lock.status {
                self.store.put_lock(owner, &current)?;
                matured += 1;
                tracing::debug!(owner = %owner, lock_id = %current.id, "Lock matured");
            }
            reconciled.push(current);
        }

        if matured > 0 {
            tracing::info!(owner = %owner, count = matured, "Persisted matured locks");
            self.metrics.record_maturity_corrections(matured);
            self.notifier.publish(LedgerEvent::LocksMatured {
                owner: owner.clone(),
                count: matured,
            });
        }

        Ok(reconciled)
    }

    /// Withdraw a matured lock, crediting its amount back to the owner
    ///
    /// Checks run in order and the first failure wins: existence,
    /// authorization, maturity, not already withdrawn.
    pub fn withdraw(
        &self,
        owner: &Owner,
        lock_id: LockId,
        requester: &Owner,
    ) -> Result<WithdrawalReceipt> {
        let result = self.try_withdraw(owner, lock_id, requester);
        self.observe("withdraw", owner, result)
    }

    fn try_withdraw(
        &self,
        owner: &Owner,
        lock_id: LockId,
        requester: &Owner,
    ) -> Result<WithdrawalReceipt> {
        let now = self.now();

        let stored = self
            .store
            .list_locks(owner)?
            .into_iter()
            .find(|lock| lock.id == lock_id)
            .ok_or(Error::NotFound(lock_id))?;

        if !stored.is_authorized(requester) {
            return Err(Error::Unauthorized {
                lock_id,
                requester: requester.clone(),
            });
        }

        if !stored.is_matured(now) {
            return Err(Error::StillLocked {
                lock_id,
                unlock_at: stored.unlock_at,
            });
        }

        if stored.status == LockStatus::Withdrawn {
            return Err(Error::AlreadyWithdrawn(lock_id));
        }

        let mut lock = reconcile_status(&stored, now);
        debug_assert!(lock.status.can_transition_to(LockStatus::Withdrawn));
        lock.status = LockStatus::Withdrawn;
        lock.withdrawn_at = Some(now);

        let balance_after = self.store.get_balance(owner)? + lock.amount;
        self.store.commit(owner, balance_after, &lock)?;

        tracing::info!(
            owner = %owner,
            lock_id = %lock_id,
            requester = %requester,
            amount = %lock.amount,
            balance = %balance_after,
            "Lock withdrawn"
        );

        self.metrics.record_withdrawal();
        self.notifier.publish(LedgerEvent::LockWithdrawn {
            owner: owner.clone(),
            lock_id,
        });

        Ok(WithdrawalReceipt {
            lock_id,
            owner: owner.clone(),
            amount: lock.amount,
            withdrawn_at: now,
            balance_after,
        })
    }

    fn observe<T>(&self, operation: &'static str, owner: &Owner, result: Result<T>) -> Result<T> {
        if let Err(ref err) = result {
            self.metrics.record_rejection(err);
            if err.is_retryable() {
                tracing::error!(operation, owner = %owner, error = %err, "Ledger operation failed");
            } else {
                tracing::warn!(operation, owner = %owner, error = %err, "Ledger operation rejected");
            }
        }
        result
    }
}
