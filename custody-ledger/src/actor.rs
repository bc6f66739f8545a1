//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer-per-owner pattern using Tokio actors:
//! - One task per owner serializes every operation on that owner's books
//! - Different owners proceed concurrently with no shared mutable state
//! - Async message passing with backpressure (bounded mailboxes)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Ledger / HistoryView                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │           OwnerRouter (DashMap<Owner, Handle>)        │
//! │       Spawns one actor per owner on first use         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              OwnerActor (Single Task)                 │
//! │   seed balance from oracle once, then LockEngine ops  │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::engine::LockEngine;
use crate::oracle::BalanceOracle;
use crate::types::{Lock, LockId, LockRequest, LockStatus, Owner, Timestamp, WithdrawalReceipt};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to an owner actor
pub enum OwnerMessage {
    /// Create a lock
    CreateLock {
        request: LockRequest,
        response: oneshot::Sender<Result<Lock>>,
    },

    /// Withdraw one lock
    Withdraw {
        lock_id: LockId,
        requester: Owner,
        response: oneshot::Sender<Result<WithdrawalReceipt>>,
    },

    /// Withdraw every matured lock the requester may withdraw
    WithdrawAll {
        requester: Owner,
        response: oneshot::Sender<Result<Vec<WithdrawalReceipt>>>,
    },

    /// Reconcile and return all locks (creation order)
    Reconcile {
        response: oneshot::Sender<Result<Vec<Lock>>>,
    },

    /// Get available balance
    GetBalance {
        response: oneshot::Sender<Result<Decimal>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns one owner's books
pub struct OwnerActor {
    owner: Owner,
    engine: Arc<LockEngine>,
    oracle: Arc<dyn BalanceOracle>,
    mailbox: mpsc::Receiver<OwnerMessage>,
    seeded: bool,
}

impl OwnerActor {
    /// Create new actor
    pub fn new(
        owner: Owner,
        engine: Arc<LockEngine>,
        oracle: Arc<dyn BalanceOracle>,
        mailbox: mpsc::Receiver<OwnerMessage>,
    ) -> Self {
        Self {
            owner,
            engine,
            oracle,
            mailbox,
            seeded: false,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        tracing::debug!(owner = %self.owner, "Owner actor started");

        while let Some(msg) = self.mailbox.recv().await {
            if let OwnerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg).await;
        }

        tracing::debug!(owner = %self.owner, "Owner actor stopped");
    }

    async fn handle_message(&mut self, msg: OwnerMessage) {
        match msg {
            OwnerMessage::CreateLock { request, response } => {
                let result = match self.ensure_seeded().await {
                    Ok(()) => self.engine.create_lock(&self.owner, request),
                    Err(e) => Err(e),
                };
                let _ = response.send(result);
            }

            OwnerMessage::Withdraw {
                lock_id,
                requester,
                response,
            } => {
                let result = match self.ensure_seeded().await {
                    Ok(()) => self.engine.withdraw(&self.owner, lock_id, &requester),
                    Err(e) => Err(e),
                };
                let _ = response.send(result);
            }

            OwnerMessage::WithdrawAll {
                requester,
                response,
            } => {
                let result = match self.ensure_seeded().await {
                    Ok(()) => self.withdraw_all(&requester),
                    Err(e) => Err(e),
                };
                let _ = response.send(result);
            }

            OwnerMessage::Reconcile { response } => {
                let result = match self.ensure_seeded().await {
                    Ok(()) => self.engine.reconcile_owner(&self.owner),
                    Err(e) => Err(e),
                };
                let _ = response.send(result);
            }

            OwnerMessage::GetBalance { response } => {
                let result = match self.ensure_seeded().await {
                    Ok(()) => self.engine.balance(&self.owner),
                    Err(e) => Err(e),
                };
                let _ = response.send(result);
            }

            OwnerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }

    /// Seed the owner's balance from the oracle the first time it is seen
    async fn ensure_seeded(&mut self) -> Result<()> {
        if self.seeded {
            return Ok(());
        }

        if !self.engine.is_seeded(&self.owner)? {
            let external = self.oracle.current_external_balance(&self.owner).await?;
            self.engine.seed_balance(&self.owner, external)?;
        }

        self.seeded = true;
        Ok(())
    }

    /// Each withdrawal is its own commit; stops at the first failure
    fn withdraw_all(&self, requester: &Owner) -> Result<Vec<WithdrawalReceipt>> {
        let locks = self.engine.reconcile_owner(&self.owner)?;

        let mut receipts = Vec::new();
        for lock in locks
            .iter()
            .filter(|lock| lock.status == LockStatus::Unlocked && lock.is_authorized(requester))
        {
            receipts.push(self.engine.withdraw(&self.owner, lock.id, requester)?);
        }

        tracing::info!(
            owner = %self.owner,
            requester = %requester,
            count = receipts.len(),
            "Withdrew all matured locks"
        );
        Ok(receipts)
    }
}

/// Handle for sending messages to one owner's actor
#[derive(Clone)]
pub struct OwnerHandle {
    sender: mpsc::Sender<OwnerMessage>,
}

impl OwnerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<OwnerMessage>) -> Self {
        Self { sender }
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> OwnerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create a lock
    pub async fn create_lock(&self, request: LockRequest) -> Result<Lock> {
        self.request(|response| OwnerMessage::CreateLock { request, response })
            .await
    }

    /// Withdraw one lock
    pub async fn withdraw(&self, lock_id: LockId, requester: Owner) -> Result<WithdrawalReceipt> {
        self.request(|response| OwnerMessage::Withdraw {
            lock_id,
            requester,
            response,
        })
        .await
    }

    /// Withdraw every matured lock the requester may withdraw
    pub async fn withdraw_all(&self, requester: Owner) -> Result<Vec<WithdrawalReceipt>> {
        self.request(|response| OwnerMessage::WithdrawAll {
            requester,
            response,
        })
        .await
    }

    /// Reconcile and return all locks in creation order
    pub async fn reconcile(&self) -> Result<Vec<Lock>> {
        self.request(|response| OwnerMessage::Reconcile { response })
            .await
    }

    /// Get available balance
    pub async fn balance(&self) -> Result<Decimal> {
        self.request(|response| OwnerMessage::GetBalance { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(OwnerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn an owner actor
///
/// The join handle resolves once the actor has stopped and released its
/// engine reference.
pub fn spawn_owner_actor(
    owner: Owner,
    engine: Arc<LockEngine>,
    oracle: Arc<dyn BalanceOracle>,
    mailbox_capacity: usize,
) -> (OwnerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = OwnerActor::new(owner, engine, oracle, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (OwnerHandle::new(tx), task)
}

/// Routes requests to per-owner actors, spawning them on demand
#[derive(Clone)]
pub struct OwnerRouter {
    actors: Arc<DashMap<Owner, OwnerHandle>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    engine: Arc<LockEngine>,
    oracle: Arc<dyn BalanceOracle>,
    mailbox_capacity: usize,
}

impl OwnerRouter {
    /// Create router
    pub fn new(
        engine: Arc<LockEngine>,
        oracle: Arc<dyn BalanceOracle>,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            actors: Arc::new(DashMap::new()),
            tasks: Arc::new(Mutex::new(Vec::new())),
            engine,
            oracle,
            mailbox_capacity,
        }
    }

    /// Handle for `owner`'s actor; must be called inside a Tokio runtime
    pub fn handle(&self, owner: &Owner) -> OwnerHandle {
        let mut entry = self
            .actors
            .entry(owner.clone())
            .or_insert_with(|| self.spawn(owner));

        // Replace an actor that stopped (runtime shutdown, shutdown message)
        if entry.is_closed() {
            *entry = self.spawn(owner);
        }
        entry.clone()
    }

    fn spawn(&self, owner: &Owner) -> OwnerHandle {
        let (handle, task) = spawn_owner_actor(
            owner.clone(),
            self.engine.clone(),
            self.oracle.clone(),
            self.mailbox_capacity,
        );

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        handle
    }

    /// Current time from the engine clock
    pub fn now(&self) -> Timestamp {
        self.engine.now()
    }

    /// Shared lock engine
    pub fn engine(&self) -> &Arc<LockEngine> {
        &self.engine
    }

    /// Number of live owner actors
    pub fn active_owners(&self) -> usize {
        self.actors.len()
    }

    /// Stop every actor and wait for it to exit
    pub async fn shutdown(&self) -> Result<()> {
        let handles: Vec<OwnerHandle> = self.actors.iter().map(|e| e.value().clone()).collect();
        self.actors.clear();

        for handle in handles {
            // An actor that already stopped has nothing to flush
            let _ = handle.shutdown().await;
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.await
                .map_err(|e| Error::Concurrency(format!("Owner actor failed: {}", e)))?;
        }
        Ok(())
    }
}
