//! Custody ledger demo binary
//!
//! Opens a ledger under `LEDGER_DATA_DIR`, locks part of an owner's seeded
//! balance for a few seconds, waits for it to mature and withdraws it.
//!
//! Usage: `ledger-demo [owner] [amount] [lock_seconds]`

use anyhow::Context;
use custody_ledger::{
    Config, FixedBalanceOracle, Ledger, LedgerEvent, LockFilter, LockRequest, LockStatus, Owner,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let owner = Owner::new(args.next().unwrap_or_else(|| "demo-owner".to_string()));
    let amount = match args.next() {
        Some(raw) => Decimal::from_str(&raw).context("amount must be a decimal")?,
        None => Decimal::new(4, 0),
    };
    let lock_seconds: i64 = match args.next() {
        Some(raw) => raw.parse().context("lock_seconds must be an integer")?,
        None => 2,
    };

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        seed_balance = %config.seed.default_balance,
        "Starting custody ledger demo"
    );

    let oracle = Arc::new(FixedBalanceOracle::new(config.seed.default_balance));
    let ledger = Ledger::open(config, oracle)
        .await
        .context("Failed to open ledger")?;

    let mut events = ledger.subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LedgerEvent::LockCreated { owner, lock_id } => {
                    tracing::info!(owner = %owner, lock_id = %lock_id, "Event: lock created")
                }
                LedgerEvent::LocksMatured { owner, count } => {
                    tracing::info!(owner = %owner, count, "Event: locks matured")
                }
                LedgerEvent::LockWithdrawn { owner, lock_id } => {
                    tracing::info!(owner = %owner, lock_id = %lock_id, "Event: lock withdrawn")
                }
            }
        }
    });

    let balance = ledger.balance(&owner).await?;
    tracing::info!(owner = %owner, balance = %balance, "Available balance");

    let unlock_at = chrono::Utc::now().timestamp() + lock_seconds;
    let lock = ledger
        .create_lock(&owner, LockRequest::new(amount, unlock_at))
        .await
        .context("Failed to create lock")?;

    tokio::time::sleep(Duration::from_secs(lock_seconds.max(0) as u64 + 1)).await;

    let snapshot = ledger.snapshot(&owner).await?;
    let summary = snapshot.summary();
    tracing::info!(
        owner = %owner,
        total_locked = %summary.total_locked,
        total_withdrawable = %summary.total_withdrawable,
        total_withdrawn = %summary.total_withdrawn,
        active = summary.active_count,
        "Snapshot"
    );

    for recent in snapshot.recent(5) {
        println!(
            "{}  {:>12} {:<4}  {:<9}  unlock_at={}",
            recent.id,
            recent.amount,
            recent.asset,
            recent.status,
            recent.unlock_at
        );
    }

    let withdrawable = snapshot.filter(&LockFilter::new().with_status(LockStatus::Unlocked));
    if withdrawable.iter().any(|l| l.id == lock.id) {
        let receipt = ledger.withdraw(&owner, lock.id, &owner).await?;
        tracing::info!(
            lock_id = %receipt.lock_id,
            amount = %receipt.amount,
            balance = %receipt.balance_after,
            "Withdrawn"
        );
    } else {
        tracing::warn!(lock_id = %lock.id, "Lock not yet withdrawable");
    }

    println!("{}", ledger.metrics().render()?);

    ledger.shutdown().await?;
    listener.abort();

    tracing::info!("Custody ledger demo finished");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("LEDGER_LOG_JSON").map_or(false, |v| v == "1") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
