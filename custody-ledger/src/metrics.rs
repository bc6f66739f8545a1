//! Metrics collection for observability
//!
//! Prometheus counters on a ledger-owned registry.
//!
//! # Metrics
//!
//! - `custody_locks_created_total` - Locks committed
//! - `custody_withdrawals_total` - Withdrawals committed
//! - `custody_maturity_corrections_total` - Stored records moved to unlocked
//! - `custody_rejected_operations_total{kind}` - Failed operations by error kind
//! - `custody_store_failures_total` - Persistence failures

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Locks committed
    pub locks_created: IntCounter,

    /// Withdrawals committed
    pub withdrawals: IntCounter,

    /// Maturity corrections persisted
    pub maturity_corrections: IntCounter,

    /// Rejected operations by error kind
    pub rejected_operations: IntCounterVec,

    /// Store failures
    pub store_failures: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let locks_created =
            IntCounter::new("custody_locks_created_total", "Total number of locks created")?;
        registry.register(Box::new(locks_created.clone()))?;

        let withdrawals =
            IntCounter::new("custody_withdrawals_total", "Total number of withdrawals")?;
        registry.register(Box::new(withdrawals.clone()))?;

        let maturity_corrections = IntCounter::new(
            "custody_maturity_corrections_total",
            "Stored lock records moved from locked to unlocked",
        )?;
        registry.register(Box::new(maturity_corrections.clone()))?;

        let rejected_operations = IntCounterVec::new(
            Opts::new(
                "custody_rejected_operations_total",
                "Failed ledger operations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations.clone()))?;

        let store_failures =
            IntCounter::new("custody_store_failures_total", "Persistence failures")?;
        registry.register(Box::new(store_failures.clone()))?;

        Ok(Self {
            locks_created,
            withdrawals,
            maturity_corrections,
            rejected_operations,
            store_failures,
            registry,
        })
    }

    /// Record lock creation
    pub fn record_lock_created(&self) {
        self.locks_created.inc();
    }

    /// Record withdrawal
    pub fn record_withdrawal(&self) {
        self.withdrawals.inc();
    }

    /// Record persisted maturity corrections
    pub fn record_maturity_corrections(&self, count: usize) {
        self.maturity_corrections.inc_by(count as u64);
    }

    /// Record a failed operation
    pub fn record_rejection(&self, err: &crate::Error) {
        self.rejected_operations.with_label_values(&[err.kind()]).inc();
        if matches!(err, crate::Error::StoreUnavailable(_)) {
            self.store_failures.inc();
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.locks_created.get(), 0);
        assert_eq!(metrics.withdrawals.get(), 0);

        // Private registries do not collide
        let other = Metrics::new().unwrap();
        other.record_lock_created();
        assert_eq!(metrics.locks_created.get(), 0);
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection(&crate::Error::StoreUnavailable("disk".into()));
        metrics.record_rejection(&crate::Error::Oracle("down".into()));

        assert_eq!(metrics.store_failures.get(), 1);
        assert_eq!(
            metrics
                .rejected_operations
                .with_label_values(&["store_unavailable"])
                .get(),
            1
        );
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_withdrawal();
        metrics.record_maturity_corrections(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("custody_withdrawals_total 1"));
        assert!(text.contains("custody_maturity_corrections_total 3"));
    }
}
