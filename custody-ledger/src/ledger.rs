//! Main ledger orchestration layer
//!
//! This module ties together storage, the lock engine and the per-owner
//! actors into a high-level API for time-locked custody.
//!
//! # Example
//!
//! ```no_run
//! use custody_ledger::{Config, FixedBalanceOracle, Ledger, LockRequest, Owner};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> custody_ledger::Result<()> {
//!     let config = Config::default();
//!     let oracle = Arc::new(FixedBalanceOracle::new(config.seed.default_balance));
//!     let ledger = Ledger::open(config, oracle).await?;
//!
//!     let owner = Owner::new("alice");
//!     let unlock_at = chrono::Utc::now().timestamp() + 60;
//!     let lock = ledger
//!         .create_lock(&owner, LockRequest::new(Decimal::new(4, 0), unlock_at))
//!         .await?;
//!     println!("locked {} until {}", lock.amount, lock.unlock_at);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::OwnerRouter,
    clock::{Clock, SystemClock},
    engine::LockEngine,
    history::{HistoryView, LockSummary, Snapshot},
    metrics::Metrics,
    notify::{LedgerEvent, Notifier},
    oracle::BalanceOracle,
    storage::{LedgerStore, RocksStore},
    types::{Lock, LockId, LockRequest, Owner, WithdrawalReceipt},
    Config, Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main ledger interface
pub struct Ledger {
    /// Routes mutations to per-owner actors
    router: OwnerRouter,

    /// Read side
    history: HistoryView,

    /// Shared engine (metrics, notifier)
    engine: Arc<LockEngine>,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("data_dir", &self.config.data_dir)
            .field("active_owners", &self.router.active_owners())
            .finish()
    }
}

impl Ledger {
    /// Open a durable ledger under `config.data_dir`
    pub async fn open(config: Config, oracle: Arc<dyn BalanceOracle>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(RocksStore::open(&config)?);

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = %config.data_dir.display(),
            "Ledger opened"
        );

        Self::from_parts(config, store, Arc::new(SystemClock), oracle)
    }

    /// Assemble a ledger from explicit parts
    ///
    /// Must be called inside a Tokio runtime before any operation is issued.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn BalanceOracle>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        let notifier = Notifier::new(config.notify.channel_capacity);
        let engine = Arc::new(LockEngine::new(store, clock, notifier, metrics));

        let router = OwnerRouter::new(engine.clone(), oracle, config.actor.mailbox_capacity);
        let history = HistoryView::new(router.clone());

        Ok(Self {
            router,
            history,
            engine,
            config,
        })
    }

    /// Lock part of `owner`'s balance until `request.unlock_at`
    ///
    /// Besides the engine's rejections (`InvalidAmount`, `InvalidSchedule`,
    /// `InsufficientFunds`, `StoreUnavailable`), the first operation on an
    /// owner consults the balance oracle and may fail with `Error::Oracle`.
    /// Nothing is seeded or committed in that case and the call can be
    /// retried as is. `Error::Concurrency` means the owner's actor stopped.
    pub async fn create_lock(&self, owner: &Owner, request: LockRequest) -> Result<Lock> {
        self.router.handle(owner).create_lock(request).await
    }

    /// Withdraw a matured lock of `owner` on behalf of `requester`
    ///
    /// Can also fail with `Error::Oracle` for an owner not seen before, as
    /// described on [`Ledger::create_lock`].
    pub async fn withdraw(
        &self,
        owner: &Owner,
        lock_id: LockId,
        requester: &Owner,
    ) -> Result<WithdrawalReceipt> {
        self.router
            .handle(owner)
            .withdraw(lock_id, requester.clone())
            .await
    }

    /// Withdraw every matured lock of `owner` that `requester` may withdraw
    ///
    /// Each withdrawal commits on its own; on failure the earlier ones stay.
    pub async fn withdraw_all(
        &self,
        owner: &Owner,
        requester: &Owner,
    ) -> Result<Vec<WithdrawalReceipt>> {
        self.router
            .handle(owner)
            .withdraw_all(requester.clone())
            .await
    }

    /// Reconciled locks of `owner`, newest first
    pub async fn snapshot(&self, owner: &Owner) -> Result<Snapshot> {
        self.history.snapshot(owner).await
    }

    /// Aggregates over `owner`'s reconciled locks
    pub async fn summary(&self, owner: &Owner) -> Result<LockSummary> {
        self.history.summary(owner).await
    }

    /// Available balance of `owner`
    pub async fn balance(&self, owner: &Owner) -> Result<Decimal> {
        self.router.handle(owner).balance().await
    }

    /// Subscribe to lock-set change events
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.engine.notifier().subscribe()
    }

    /// History view (cheap to clone)
    pub fn history(&self) -> &HistoryView {
        &self.history
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        self.engine.metrics()
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(owners = self.router.active_owners(), "Shutting down ledger");
        self.router.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FixedBalanceOracle;
    use crate::types::LockStatus;

    async fn create_test_ledger(dir: &tempfile::TempDir) -> Ledger {
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        Ledger::open(config, Arc::new(FixedBalanceOracle::new(Decimal::TEN)))
            .await
            .unwrap()
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir).await;
        assert_eq!(ledger.config().data_dir, dir.path());
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        config.actor.mailbox_capacity = 0;

        let result = Ledger::open(config, Arc::new(FixedBalanceOracle::new(Decimal::TEN))).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_create_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir).await;
        let alice = Owner::new("alice");

        let lock = ledger
            .create_lock(&alice, LockRequest::new(Decimal::new(4, 0), now() + 3_600))
            .await
            .unwrap();
        assert_eq!(ledger.balance(&alice).await.unwrap(), Decimal::new(6, 0));

        let snapshot = ledger.snapshot(&alice).await.unwrap();
        assert_eq!(snapshot.locks.len(), 1);
        assert_eq!(snapshot.locks[0].id, lock.id);
        assert_eq!(snapshot.locks[0].status, LockStatus::Locked);

        let summary = ledger.summary(&alice).await.unwrap();
        assert_eq!(summary.total_locked, Decimal::new(4, 0));
        assert_eq!(summary.active_count, 1);
        assert_eq!(ledger.metrics().locks_created.get(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_withdraw_before_unlock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir).await;
        let alice = Owner::new("alice");

        let lock = ledger
            .create_lock(&alice, LockRequest::new(Decimal::ONE, now() + 3_600))
            .await
            .unwrap();

        let result = ledger.withdraw(&alice, lock.id, &alice).await;
        assert!(matches!(result, Err(Error::StillLocked { .. })));
        assert_eq!(ledger.balance(&alice).await.unwrap(), Decimal::new(9, 0));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let alice = Owner::new("alice");

        let lock = {
            let ledger = create_test_ledger(&dir).await;
            let lock = ledger
                .create_lock(&alice, LockRequest::new(Decimal::new(3, 0), now() + 3_600))
                .await
                .unwrap();
            ledger.shutdown().await.unwrap();
            lock
        };

        // Shutdown has joined every actor, so the database lock is free
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        // A different oracle balance must not reseed a known owner
        let ledger = Ledger::open(config, Arc::new(FixedBalanceOracle::new(Decimal::ONE)))
            .await
            .unwrap();

        assert_eq!(ledger.balance(&alice).await.unwrap(), Decimal::new(7, 0));
        let snapshot = ledger.snapshot(&alice).await.unwrap();
        assert_eq!(snapshot.locks, vec![lock]);

        ledger.shutdown().await.unwrap();
    }
}
