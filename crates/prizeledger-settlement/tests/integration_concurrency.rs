//! Integration test: concurrent payouts against one escrow
//!
//! The escrow row lock serializes payouts for the same tournament: of two
//! racing payouts that together exceed the locked balance, exactly one
//! wins. Payouts against different tournaments do not interfere, and
//! overlapping distribution runs over one pool pay each winner once.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::Ledger;
use prizeledger_settlement::{PrizeDistributor, Winner};
use prizeledger_store::{LedgerStore, TransactionFilter};
use prizeledger_types::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn paypal() -> PayoutDetails {
    PayoutDetails::via(PaymentMethod::Paypal, Currency::Usd)
}

#[test]
fn racing_payouts_exactly_one_wins() {
    for _ in 0..20 {
        let ledger = Arc::new(Ledger::new());
        let t = TournamentId::new();
        ledger.escrows.create_prize_escrow(t, dec!(30000.00)).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [dec!(20000.00), dec!(15000.00)]
            .into_iter()
            .map(|amount| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let winner = ledger.verified_user(PaymentMethod::Paypal);
                thread::spawn(move || {
                    barrier.wait();
                    (
                        amount,
                        ledger
                            .payouts
                            .process_prize_payout(winner, t, amount, &paypal()),
                    )
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<Decimal> = outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(amount, _)| *amount)
            .collect();
        assert_eq!(winners.len(), 1, "outcomes: {outcomes:?}");
        let loser = outcomes.iter().find_map(|(_, r)| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::InsufficientFunds);

        let escrow = ledger.escrows.get_escrow(t).unwrap();
        assert_eq!(escrow.locked_amount, dec!(30000.00) - winners[0]);
        assert_eq!(escrow.released_amount, winners[0]);
        ledger.conservation.verify(t).unwrap();
        assert_eq!(ledger.paypal.call_count(), 1);
        assert_eq!(ledger.store.held_lock_count(), 0);

        // Never more than one completed payout row.
        let completed = ledger.store.transactions(
            &TransactionFilter::new()
                .of_type(TransactionType::PrizePayout)
                .with_status(TransactionStatus::Completed),
        );
        assert_eq!(completed.len(), 1);
    }
}

#[test]
fn different_tournaments_proceed_independently() {
    let ledger = Arc::new(Ledger::new());
    let tournaments: Vec<_> = (0..8).map(|_| TournamentId::new()).collect();
    for t in &tournaments {
        ledger.escrows.create_prize_escrow(*t, dec!(1000.00)).unwrap();
    }
    let barrier = Arc::new(Barrier::new(tournaments.len()));

    let handles: Vec<_> = tournaments
        .iter()
        .map(|&t| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            let winner = ledger.verified_user(PaymentMethod::Paypal);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..4 {
                    ledger
                        .payouts
                        .process_prize_payout(winner, t, dec!(250.00), &paypal())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for t in tournaments {
        let escrow = ledger.escrows.get_escrow(t).unwrap();
        assert_eq!(escrow.locked_amount, Decimal::ZERO);
        assert_eq!(escrow.status, EscrowStatus::Completed);
        ledger.conservation.verify(t).unwrap();
    }
}

#[test]
fn concurrent_funding_is_not_lost() {
    let ledger = Arc::new(Ledger::new());
    let t = TournamentId::new();
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    ledger.escrows.add_to_escrow(t, dec!(10.00)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let escrow = ledger.escrows.get_escrow(t).unwrap();
    assert_eq!(escrow.total_amount, dec!(600.00));
    assert_eq!(escrow.locked_amount, dec!(600.00));
}

/// A rail that takes a while to answer payouts.
struct SlowRail {
    inner: FakeProcessor,
    delay: Duration,
}

impl ProcessorAdapter for SlowRail {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn submit_payment(&self, request: &ProcessorRequest) -> ProcessorResult {
        self.inner.submit_payment(request)
    }

    fn submit_payout(&self, request: &ProcessorRequest) -> ProcessorResult {
        thread::sleep(self.delay);
        self.inner.submit_payout(request)
    }
}

#[test]
fn overlapping_distributions_pay_each_winner_once() {
    let ledger = Arc::new(Ledger::new());
    let t = TournamentId::new();
    let structure = DistributionStructure::from_pairs([("1", dec!(1.0))]).unwrap();
    let pool = ledger
        .pools
        .create_prize_pool(t, dec!(100.00), Currency::Usd, structure)
        .unwrap();
    ledger.pools.activate(pool.id).unwrap();
    ledger.escrows.create_prize_escrow(t, dec!(1000.00)).unwrap();
    let winner = ledger.verified_user(PaymentMethod::Paypal);

    let rail = Arc::new(SlowRail {
        inner: FakeProcessor::approving("slowpay"),
        delay: Duration::from_millis(100),
    });
    let registry = ProcessorRegistry::new().with(PaymentMethod::Paypal, rail.clone());
    let distributor = Arc::new(PrizeDistributor::new(
        Arc::clone(&ledger.store),
        registry,
        &LedgerConfig::default(),
    ));
    let winners = vec![Winner::new(winner, 1)];
    let details = HashMap::from([(winner, paypal())]);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let distributor = Arc::clone(&distributor);
            let barrier = Arc::clone(&barrier);
            let winners = winners.clone();
            let details = details.clone();
            thread::spawn(move || {
                barrier.wait();
                distributor.distribute(pool.id, &winners, &details)
            })
        })
        .collect();
    let runs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for run in &runs {
        if let Err(err) = run {
            assert_eq!(err.kind(), ErrorKind::State, "runs: {runs:?}");
        }
    }
    assert!(runs.iter().any(|r| r.as_ref().is_ok_and(|report| report.all_paid())));

    assert_eq!(rail.inner.call_count(), 1);
    let completed: Vec<_> = ledger
        .store
        .payouts_for_winner(winner)
        .into_iter()
        .filter(|p| p.status == PayoutStatus::Completed)
        .collect();
    assert_eq!(completed.len(), 1);
    let escrow = ledger.escrows.get_escrow(t).unwrap();
    assert_eq!(escrow.released_amount, dec!(100.00));
    assert_eq!(escrow.locked_amount, dec!(900.00));
    assert_eq!(
        ledger.pools.get_prize_pool(pool.id).unwrap().status,
        PrizePoolStatus::Distributed
    );
    ledger.conservation.verify(t).unwrap();
    assert_eq!(ledger.store.held_lock_count(), 0);
}
