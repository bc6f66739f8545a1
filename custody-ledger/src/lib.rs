//! Custody Ledger
//!
//! Time-locked custody of fungible balances. An owner moves part of an
//! available balance into a lock that cannot be withdrawn before its unlock
//! time; once matured, the owner (or the named recipient) withdraws it and
//! the amount is credited back.
//!
//! # Architecture
//!
//! - **Ledger Store**: Owner-scoped balances and lock records, atomic commits
//! - **Lock Engine**: The only writer of statuses and balances
//! - **History View**: Reconciled, newest-first projections and aggregates
//! - **Single Writer per Owner**: One actor task per owner serializes mutations
//!
//! # Invariants
//!
//! - Conservation: balance + Σ(active lock amounts) is constant between seedings
//! - Monotonic status: locked → unlocked → withdrawn, never backwards
//! - At-most-once withdrawal per lock
//! - Nothing withdrawable before its unlock time

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod actor;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod oracle;
pub mod storage;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{reconcile_status, LockEngine};
pub use error::{Error, Result};
pub use history::{HistoryView, LockFilter, LockSummary, Snapshot};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use notify::{LedgerEvent, Notifier};
pub use oracle::{BalanceOracle, FixedBalanceOracle};
pub use storage::{LedgerStore, MemoryStore, RocksStore};
pub use types::{
    Asset, Lock, LockId, LockRequest, LockStatus, Owner, Timestamp, WithdrawalReceipt,
};
