//! Ledger store
//!
//! Owner-scoped persistence for balances and lock records. No business
//! logic lives here; the lock engine decides what to write.
//!
//! # Column Families
//!
//! - `balances` - Available balance per owner (key: owner, value: decimal string)
//! - `locks` - Lock records per owner (key: owner, value: JSON array in creation order)

use crate::{
    error::{Error, Result},
    types::{Lock, Owner},
    Config,
};
use parking_lot::RwLock;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, WriteOptions, DB};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_LOCKS: &str = "locks";

/// Owner-scoped balance and lock persistence
///
/// Every write is durable when the call returns. `commit` writes a balance
/// and a lock record as one atomic operation.
pub trait LedgerStore: Send + Sync {
    /// Balance of `owner`, zero if never written
    fn get_balance(&self, owner: &Owner) -> Result<Decimal>;

    /// Whether a balance was ever written for `owner`
    fn has_balance(&self, owner: &Owner) -> Result<bool>;

    /// Overwrite the balance of `owner`
    fn set_balance(&self, owner: &Owner, balance: Decimal) -> Result<()>;

    /// Locks of `owner` in creation order
    fn list_locks(&self, owner: &Owner) -> Result<Vec<Lock>>;

    /// Insert a lock, or overwrite the record with the same id
    fn put_lock(&self, owner: &Owner, lock: &Lock) -> Result<()>;

    /// Write balance and lock together, all or nothing
    fn commit(&self, owner: &Owner, balance: Decimal, lock: &Lock) -> Result<()>;
}

/// Replace the record with the same id, or append
fn upsert(locks: &mut Vec<Lock>, lock: &Lock) {
    match locks.iter_mut().find(|existing| existing.id == lock.id) {
        Some(existing) => *existing = lock.clone(),
        None => locks.push(lock.clone()),
    }
}

/// RocksDB-backed store
pub struct RocksStore {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path).map_err(|e| {
            Error::StoreUnavailable(format!("Cannot create {}: {}", path.display(), e))
        })?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_LOCKS, Self::cf_options_locks()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, sync_writes = config.rocksdb.sync_writes, "Opened ledger store");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Point lookups on every operation
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_locks() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StoreUnavailable(format!("Column family {} not found", name)))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    fn encode_balance(balance: Decimal) -> Vec<u8> {
        balance.to_string().into_bytes()
    }

    fn decode_balance(bytes: &[u8]) -> Result<Decimal> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::StoreUnavailable(format!("balance encoding: {}", e)))?;
        Ok(Decimal::from_str(text)?)
    }
}

impl LedgerStore for RocksStore {
    fn get_balance(&self, owner: &Owner) -> Result<Decimal> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, owner.as_str().as_bytes())? {
            Some(bytes) => Self::decode_balance(&bytes),
            None => Ok(Decimal::ZERO),
        }
    }

    fn has_balance(&self, owner: &Owner) -> Result<bool> {
        let cf = self.cf_handle(CF_BALANCES)?;
        Ok(self.db.get_cf(cf, owner.as_str().as_bytes())?.is_some())
    }

    fn set_balance(&self, owner: &Owner, balance: Decimal) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        self.db.put_cf_opt(
            cf,
            owner.as_str().as_bytes(),
            Self::encode_balance(balance),
            &self.write_options(),
        )?;

        tracing::debug!(owner = %owner, balance = %balance, "Balance written");
        Ok(())
    }

    fn list_locks(&self, owner: &Owner) -> Result<Vec<Lock>> {
        let cf = self.cf_handle(CF_LOCKS)?;
        match self.db.get_cf(cf, owner.as_str().as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn put_lock(&self, owner: &Owner, lock: &Lock) -> Result<()> {
        let mut locks = self.list_locks(owner)?;
        upsert(&mut locks, lock);

        let cf = self.cf_handle(CF_LOCKS)?;
        let value = serde_json::to_vec(&locks)?;
        self.db
            .put_cf_opt(cf, owner.as_str().as_bytes(), value, &self.write_options())?;

        tracing::debug!(owner = %owner, lock_id = %lock.id, status = %lock.status, "Lock written");
        Ok(())
    }

    fn commit(&self, owner: &Owner, balance: Decimal, lock: &Lock) -> Result<()> {
        let mut locks = self.list_locks(owner)?;
        upsert(&mut locks, lock);

        let mut batch = WriteBatch::default();

        let cf_balances = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(cf_balances, owner.as_str().as_bytes(), Self::encode_balance(balance));

        let cf_locks = self.cf_handle(CF_LOCKS)?;
        batch.put_cf(cf_locks, owner.as_str().as_bytes(), serde_json::to_vec(&locks)?);

        // Atomic commit
        self.db.write_opt(batch, &self.write_options())?;

        tracing::debug!(
            owner = %owner,
            lock_id = %lock.id,
            status = %lock.status,
            balance = %balance,
            "Balance and lock committed"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OwnerRecord {
    balance: Option<Decimal>,
    locks: Vec<Lock>,
}

/// In-memory store for tests and demos
///
/// `set_fail_writes(true)` makes every write return `StoreUnavailable`
/// without touching state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    owners: RwLock<HashMap<Owner, OwnerRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle write failure injection
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("write rejected".to_string()));
        }
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    fn get_balance(&self, owner: &Owner) -> Result<Decimal> {
        Ok(self
            .owners
            .read()
            .get(owner)
            .and_then(|record| record.balance)
            .unwrap_or(Decimal::ZERO))
    }

    fn has_balance(&self, owner: &Owner) -> Result<bool> {
        Ok(self
            .owners
            .read()
            .get(owner)
            .map_or(false, |record| record.balance.is_some()))
    }

    fn set_balance(&self, owner: &Owner, balance: Decimal) -> Result<()> {
        self.check_writable()?;
        self.owners.write().entry(owner.clone()).or_default().balance = Some(balance);
        Ok(())
    }

    fn list_locks(&self, owner: &Owner) -> Result<Vec<Lock>> {
        Ok(self
            .owners
            .read()
            .get(owner)
            .map(|record| record.locks.clone())
            .unwrap_or_default())
    }

    fn put_lock(&self, owner: &Owner, lock: &Lock) -> Result<()> {
        self.check_writable()?;
        let mut owners = self.owners.write();
        upsert(&mut owners.entry(owner.clone()).or_default().locks, lock);
        Ok(())
    }

    fn commit(&self, owner: &Owner, balance: Decimal, lock: &Lock) -> Result<()> {
        self.check_writable()?;
        let mut owners = self.owners.write();
        let record = owners.entry(owner.clone()).or_default();
        record.balance = Some(balance);
        upsert(&mut record.locks, lock);
        Ok(())
    }
}
