//! Error types for the custody ledger

use crate::types::{LockId, Owner, Timestamp};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Owner balance does not cover the requested lock
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Current balance
        available: Decimal,
        /// Requested lock amount
        requested: Decimal,
    },

    /// Unlock time is not strictly after the creation time
    #[error("Invalid schedule: unlock time {unlock_at} is not after {now}")]
    InvalidSchedule {
        /// Requested unlock time
        unlock_at: Timestamp,
        /// Creation time
        now: Timestamp,
    },

    /// Lock amount is zero or negative
    #[error("Invalid amount: {0} (amount must be positive)")]
    InvalidAmount(Decimal),

    /// Lock does not exist under the owner
    #[error("Lock not found: {0}")]
    NotFound(LockId),

    /// Requester is neither the recipient nor, absent one, the owner
    #[error("Unauthorized: {requester} may not withdraw lock {lock_id}")]
    Unauthorized {
        /// Target lock
        lock_id: LockId,
        /// Identity that asked
        requester: Owner,
    },

    /// Unlock time not reached
    #[error("Lock {lock_id} is still locked until {unlock_at}")]
    StillLocked {
        /// Target lock
        lock_id: LockId,
        /// Maturity time
        unlock_at: Timestamp,
    },

    /// Lock was withdrawn before
    #[error("Lock already withdrawn: {0}")]
    AlreadyWithdrawn(LockId),

    /// Persistence failure (RocksDB, encoding, injected faults)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// External balance oracle failure
    #[error("Balance oracle error: {0}")]
    Oracle(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same request unmodified may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Oracle(_) | Error::Concurrency(_)
        )
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::InvalidSchedule { .. } => "invalid_schedule",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::NotFound(_) => "not_found",
            Error::Unauthorized { .. } => "unauthorized",
            Error::StillLocked { .. } => "still_locked",
            Error::AlreadyWithdrawn(_) => "already_withdrawn",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Oracle(_) => "oracle",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::StoreUnavailable(format!("record encoding: {}", err))
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::StoreUnavailable(format!("balance encoding: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infrastructure_errors_are_retryable() {
        let id = LockId::generate();
        assert!(Error::StoreUnavailable("disk".into()).is_retryable());
        assert!(Error::Oracle("timeout".into()).is_retryable());

        assert!(!Error::AlreadyWithdrawn(id).is_retryable());
        assert!(!Error::NotFound(id).is_retryable());
        assert!(!Error::InvalidAmount(Decimal::ZERO).is_retryable());
        assert!(!Error::InsufficientFunds {
            available: Decimal::ONE,
            requested: Decimal::TEN,
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientFunds {
            available: Decimal::new(3, 0),
            requested: Decimal::new(5, 0),
        };
        assert_eq!(err.to_string(), "Insufficient funds: available 3, requested 5");
        assert_eq!(err.kind(), "insufficient_funds");
    }
}
