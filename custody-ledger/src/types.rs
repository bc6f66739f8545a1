//! Core types for the custody ledger
//!
//! All types are designed for:
//! - Stable JSON persistence (camelCase records, lowercase status strings)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money, stored as decimal strings)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds since the Unix epoch
pub type Timestamp = i64;

/// Owner identity (wallet address, account handle, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    /// Create new owner identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Owner {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lock identifier (UUIDv7, so ids sort by creation time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(Uuid);

impl LockId {
    /// Generate a fresh lock id
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from the hyphenated string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset tag carried by a lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Asset {
    /// Native SOL
    #[default]
    SOL,
    /// USD Coin
    USDC,
}

impl Asset {
    /// Ticker code
    pub fn code(&self) -> &'static str {
        match self {
            Asset::SOL => "SOL",
            Asset::USDC => "USDC",
        }
    }

    /// Parse from ticker code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "SOL" => Some(Asset::SOL),
            "USDC" => Some(Asset::USDC),
            _ => None,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

/// Lock status
///
/// Ordered so that a valid lifecycle is strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LockStatus {
    /// Funds committed, unlock time not reached
    Locked = 1,
    /// Unlock time reached, funds withdrawable
    Unlocked = 2,
    /// Funds released back to the owner's balance (terminal)
    Withdrawn = 3,
}

impl LockStatus {
    /// Persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Locked => "locked",
            LockStatus::Unlocked => "unlocked",
            LockStatus::Withdrawn => "withdrawn",
        }
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, LockStatus::Withdrawn)
    }

    /// Whether `next` is the single legal step forward from this status
    pub fn can_transition_to(&self, next: LockStatus) -> bool {
        matches!(
            (self, next),
            (LockStatus::Locked, LockStatus::Unlocked) | (LockStatus::Unlocked, LockStatus::Withdrawn)
        )
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A time-gated commitment of funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    /// Unique lock ID
    pub id: LockId,

    /// Owner who funded the lock
    pub owner: Owner,

    /// Locked amount (exact decimal, never mutated)
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// Asset tag
    #[serde(default)]
    pub asset: Asset,

    /// Creation time
    pub created_at: Timestamp,

    /// Time from which withdrawal is legal
    pub unlock_at: Timestamp,

    /// Identity allowed to withdraw; the owner when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Owner>,

    /// Current status
    pub status: LockStatus,

    /// Withdrawal time (set once, on withdrawal)
    #[serde(default)]
    pub withdrawn_at: Option<Timestamp>,
}

impl Lock {
    /// Maturity predicate: `now >= unlock_at`
    pub fn is_matured(&self, now: Timestamp) -> bool {
        now >= self.unlock_at
    }

    /// Identity that may withdraw this lock
    pub fn withdrawer(&self) -> &Owner {
        self.recipient.as_ref().unwrap_or(&self.owner)
    }

    /// Check whether `requester` may withdraw this lock
    pub fn is_authorized(&self, requester: &Owner) -> bool {
        self.withdrawer() == requester
    }

    /// Still holding funds (not withdrawn)
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Seconds left until maturity, zero once matured
    pub fn seconds_until_unlock(&self, now: Timestamp) -> i64 {
        (self.unlock_at - now).max(0)
    }
}

/// Parameters for a new lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    /// Amount to lock
    pub amount: Decimal,

    /// Asset tag
    pub asset: Asset,

    /// Unlock time
    pub unlock_at: Timestamp,

    /// Optional withdrawer other than the owner
    pub recipient: Option<Owner>,
}

impl LockRequest {
    /// Create a request for `amount` unlocking at `unlock_at`
    pub fn new(amount: Decimal, unlock_at: Timestamp) -> Self {
        Self {
            amount,
            asset: Asset::default(),
            unlock_at,
            recipient: None,
        }
    }

    /// Set the asset tag
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = asset;
        self
    }

    /// Set a recipient
    pub fn with_recipient(mut self, recipient: impl Into<Owner>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Proof of a successful withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    /// Withdrawn lock
    pub lock_id: LockId,

    /// Owner whose balance was credited
    pub owner: Owner,

    /// Credited amount
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// Withdrawal time
    pub withdrawn_at: Timestamp,

    /// Owner balance after the credit
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,
}
