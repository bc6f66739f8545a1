//! External balance oracle
//!
//! The wallet layer knows an owner's real balance; the ledger asks it once,
//! the first time it sees the owner, and keeps its own books afterwards.

use crate::{types::Owner, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Source of an owner's starting balance
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Current balance held outside the ledger
    async fn current_external_balance(&self, owner: &Owner) -> Result<Decimal>;
}

/// Oracle answering from a fixed table
#[derive(Debug, Clone)]
pub struct FixedBalanceOracle {
    default_balance: Decimal,
    balances: HashMap<Owner, Decimal>,
}

impl FixedBalanceOracle {
    /// Every owner starts with `default_balance`
    pub fn new(default_balance: Decimal) -> Self {
        Self {
            default_balance,
            balances: HashMap::new(),
        }
    }

    /// Override the balance reported for one owner
    pub fn with_balance(mut self, owner: impl Into<Owner>, balance: Decimal) -> Self {
        self.balances.insert(owner.into(), balance);
        self
    }
}

#[async_trait]
impl BalanceOracle for FixedBalanceOracle {
    async fn current_external_balance(&self, owner: &Owner) -> Result<Decimal> {
        Ok(self
            .balances
            .get(owner)
            .copied()
            .unwrap_or(self.default_balance))
    }
}
