//! Property-based tests for ledger invariants
//!
//! These tests use proptest to drive random operation sequences through the
//! lock engine and check after every step:
//! - Conservation: balance + Σ(active lock amounts) == seeded balance
//! - Monotonic status: stored status never moves backwards
//! - At-most-once withdrawal per lock
//! - No withdrawal succeeds before the unlock time

use custody_ledger::{
    reconcile_status, Error, LedgerStore, Lock, LockEngine, LockId, LockRequest, LockStatus,
    ManualClock, MemoryStore, Metrics, Notifier, Owner,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

const T0: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
enum Op {
    Create { amount: Decimal, delay: i64 },
    Advance(i64),
    Withdraw(usize),
    Reconcile,
}

/// Strategy for generating lock amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..5_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (amount_strategy(), 1i64..500).prop_map(|(amount, delay)| Op::Create { amount, delay }),
        2 => (0i64..300).prop_map(Op::Advance),
        3 => (0usize..16).prop_map(Op::Withdraw),
        1 => Just(Op::Reconcile),
    ]
}

fn active_total(locks: &[Lock]) -> Decimal {
    locks
        .iter()
        .filter(|lock| lock.status != LockStatus::Withdrawn)
        .map(|lock| lock.amount)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lifecycle_invariants(
        initial in (0i64..20_000).prop_map(|cents| Decimal::new(cents, 2)),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let owner = Owner::new("alice");
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        let engine = LockEngine::new(
            store.clone(),
            Arc::new(clock.clone()),
            Notifier::new(8),
            Metrics::new().unwrap(),
        );
        engine.seed_balance(&owner, initial).unwrap();

        let mut created: Vec<LockId> = Vec::new();
        let mut seen: HashMap<LockId, LockStatus> = HashMap::new();
        let mut withdrawals: HashMap<LockId, usize> = HashMap::new();

        for op in ops {
            match op {
                Op::Create { amount, delay } => {
                    let before = engine.balance(&owner).unwrap();
                    match engine.create_lock(&owner, LockRequest::new(amount, clock_now(&engine) + delay)) {
                        Ok(lock) => {
                            prop_assert!(amount <= before);
                            created.push(lock.id);
                        }
                        Err(Error::InsufficientFunds { available, requested }) => {
                            prop_assert_eq!(available, before);
                            prop_assert!(requested > available);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                }
                Op::Advance(seconds) => clock.advance(seconds),
                Op::Withdraw(index) => {
                    if created.is_empty() {
                        continue;
                    }
                    let lock_id = created[index % created.len()];
                    let stored = store
                        .list_locks(&owner)
                        .unwrap()
                        .into_iter()
                        .find(|lock| lock.id == lock_id)
                        .unwrap();

                    match engine.withdraw(&owner, lock_id, &owner) {
                        Ok(receipt) => {
                            prop_assert!(receipt.withdrawn_at >= stored.unlock_at);
                            *withdrawals.entry(lock_id).or_insert(0) += 1;
                        }
                        Err(Error::StillLocked { .. }) => {
                            prop_assert!(clock_now(&engine) < stored.unlock_at);
                        }
                        Err(Error::AlreadyWithdrawn(_)) => {
                            prop_assert_eq!(stored.status, LockStatus::Withdrawn);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                }
                Op::Reconcile => {
                    engine.reconcile_owner(&owner).unwrap();
                }
            }

            let locks = store.list_locks(&owner).unwrap();
            let balance = engine.balance(&owner).unwrap();

            prop_assert!(balance >= Decimal::ZERO);
            prop_assert_eq!(balance + active_total(&locks), initial);

            for lock in &locks {
                if let Some(previous) = seen.insert(lock.id, lock.status) {
                    prop_assert!(lock.status >= previous);
                }
                prop_assert_eq!(
                    lock.withdrawn_at.is_some(),
                    lock.status == LockStatus::Withdrawn
                );
            }
        }

        prop_assert!(withdrawals.values().all(|count| *count == 1));
    }

    #[test]
    fn prop_reconcile_status_matches_predicate(
        unlock_offset in -1_000i64..1_000,
        status in prop_oneof![
            Just(LockStatus::Locked),
            Just(LockStatus::Unlocked),
            Just(LockStatus::Withdrawn),
        ],
    ) {
        let lock = Lock {
            id: LockId::generate(),
            owner: Owner::new("alice"),
            amount: Decimal::ONE,
            asset: Default::default(),
            created_at: T0 - 2_000,
            unlock_at: T0 + unlock_offset,
            recipient: None,
            status,
            withdrawn_at: (status == LockStatus::Withdrawn).then_some(T0),
        };

        let reconciled = reconcile_status(&lock, T0);
        let expected = match status {
            LockStatus::Locked if T0 >= lock.unlock_at => LockStatus::Unlocked,
            other => other,
        };

        prop_assert_eq!(reconciled.status, expected);
        prop_assert!(reconciled.status >= lock.status);
        prop_assert_eq!(reconciled.amount, lock.amount);
        prop_assert_eq!(reconciled.withdrawn_at, lock.withdrawn_at);
        // Idempotent
        prop_assert_eq!(reconcile_status(&reconciled, T0), reconciled);
    }
}

fn clock_now(engine: &LockEngine) -> i64 {
    engine.now()
}

#[test]
fn test_withdraw_exactly_at_unlock_boundary() {
    let owner = Owner::new("alice");
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(T0);
    let engine = LockEngine::new(
        store,
        Arc::new(clock.clone()),
        Notifier::new(8),
        Metrics::new().unwrap(),
    );
    engine.seed_balance(&owner, Decimal::TEN).unwrap();

    let lock = engine
        .create_lock(&owner, LockRequest::new(Decimal::ONE, T0 + 60))
        .unwrap();

    clock.set(T0 + 59);
    assert!(matches!(
        engine.withdraw(&owner, lock.id, &owner),
        Err(Error::StillLocked { .. })
    ));

    clock.set(T0 + 60);
    engine.withdraw(&owner, lock.id, &owner).unwrap();
    assert_eq!(engine.balance(&owner).unwrap(), Decimal::TEN);
}
