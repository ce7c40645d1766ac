//! Integration test: units of work under contention
//!
//! Two units touching the same escrow row serialize on its lock; a unit
//! that cannot get the lock in time fails with a concurrency error and
//! leaves nothing behind.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use prizeledger_store::{InMemoryLedgerStore, LedgerStore, LedgerTx, RowKey};
use prizeledger_types::*;
use rust_decimal_macros::dec;

fn seeded_store(tournament: TournamentId) -> InMemoryLedgerStore {
    let store = InMemoryLedgerStore::new(Duration::from_millis(500));
    let mut tx = store.begin();
    tx.put_escrow(PrizeEscrow::locked(tournament, dec!(1000.00), 30, Utc::now()));
    tx.commit().unwrap();
    store
}

#[test]
fn concurrent_releases_serialize_on_escrow_lock() {
    let tournament = TournamentId::new();
    let store = Arc::new(seeded_store(tournament));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut tx = store.begin();
                let mut escrow = tx.lock_escrow(tournament)?;
                escrow.release(dec!(300.00))?;
                tx.put_escrow(escrow);
                tx.commit()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 3);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(LedgerError::InsufficientEscrowFunds { .. })
    )));

    let escrow = store.escrow(tournament).unwrap();
    assert_eq!(escrow.locked_amount, dec!(100.00));
    assert_eq!(escrow.released_amount, dec!(900.00));
    assert_eq!(store.held_lock_count(), 0);
}

#[test]
fn lock_wait_times_out() {
    let tournament = TournamentId::new();
    let store = InMemoryLedgerStore::new(Duration::from_millis(20));
    let mut holder = store.begin();
    holder.lock(RowKey::Escrow(tournament)).unwrap();

    let err = thread::scope(|s| {
        s.spawn(|| {
            let mut waiter = store.begin();
            waiter.lock(RowKey::Escrow(tournament)).unwrap_err()
        })
        .join()
        .unwrap()
    });
    assert!(matches!(err, LedgerError::LockTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Concurrency);
    drop(holder);
    assert_eq!(store.held_lock_count(), 0);
}

#[test]
fn out_of_order_lock_is_refused() {
    let store = InMemoryLedgerStore::default();
    let mut tx = store.begin();
    tx.lock(RowKey::Payout(PayoutId::new())).unwrap();
    let err = tx.lock(RowKey::Escrow(TournamentId::new())).unwrap_err();
    assert!(matches!(err, LedgerError::LockOrderViolation { .. }));
}

#[test]
fn pool_and_escrow_commit_together() {
    let store = InMemoryLedgerStore::default();
    let tournament = TournamentId::new();
    let structure =
        DistributionStructure::from_pairs([("1", dec!(0.5)), ("2", dec!(0.3)), ("3", dec!(0.2))])
            .unwrap();
    let mut pool = PrizePool::new(tournament, dec!(1000.00), Currency::Usd, structure);
    let escrow = PrizeEscrow::locked(tournament, dec!(1000.00), 30, Utc::now());
    pool.escrow_account_id = Some(escrow.escrow_account_id.clone());

    let mut tx = store.begin();
    tx.lock(RowKey::PrizePool(pool.id)).unwrap();
    tx.lock(RowKey::Escrow(tournament)).unwrap();
    tx.put_prize_pool(pool.clone());
    tx.put_escrow(escrow);
    tx.commit().unwrap();

    let stored = store.prize_pool_for_tournament(tournament).unwrap();
    assert_eq!(stored.id, pool.id);
    assert_eq!(
        stored.escrow_account_id,
        store.escrow(tournament).map(|e| e.escrow_account_id)
    );

    let mut dup = store.begin();
    dup.put_prize_pool(PrizePool::new(
        tournament,
        dec!(5.00),
        Currency::Usd,
        stored.distribution_structure.clone(),
    ));
    assert!(matches!(
        dup.commit(),
        Err(LedgerError::PrizePoolAlreadyExists(t)) if t == tournament
    ));
}
