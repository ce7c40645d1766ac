//! Integration test: the reference money flows
//!
//! Scenario A: fund escrow, pay a winner, fee capped at 100.00
//! Scenario B: over-draw is refused and changes nothing
//! Scenario C: entry fee with a 5% platform cut
//! Scenario D: unclaimed positions are not redistributed
//! plus the escrow idempotency guard and the refund round-trip.

mod common;

use std::collections::HashMap;

use common::Ledger;
use prizeledger_settlement::{Timeframe, Winner};
use prizeledger_store::{LedgerStore, TransactionFilter};
use prizeledger_types::*;
use rust_decimal_macros::dec;

fn paypal() -> PayoutDetails {
    PayoutDetails::via(PaymentMethod::Paypal, Currency::Usd)
}

#[test]
fn scenario_a_and_b_payout_then_overdraw() {
    let ledger = Ledger::new();
    let t = TournamentId::new();
    let winner = ledger.verified_user(PaymentMethod::Paypal);

    let escrow = ledger.escrows.create_prize_escrow(t, dec!(50000.00)).unwrap();
    assert_eq!(escrow.locked_amount, dec!(50000.00));
    assert_eq!(escrow.released_amount, dec!(0.00));
    assert_eq!(escrow.status, EscrowStatus::Locked);

    // A
    let receipt = ledger
        .payouts
        .process_prize_payout(winner, t, dec!(20000.00), &paypal())
        .unwrap();
    let escrow = ledger.escrows.get_escrow(t).unwrap();
    assert_eq!(escrow.locked_amount, dec!(30000.00));
    assert_eq!(escrow.released_amount, dec!(20000.00));

    let row = ledger.store.transaction(receipt.transaction_id).unwrap();
    assert_eq!(row.transaction_type(), TransactionType::PrizePayout);
    assert_eq!(row.amount, dec!(20000.00));
    assert_eq!(row.platform_fee, dec!(100.00));
    assert_eq!(row.net_amount, dec!(19900.00));
    assert_eq!(row.status, TransactionStatus::Completed);

    // B
    let err = ledger
        .payouts
        .process_prize_payout(winner, t, dec!(40000.00), &paypal())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    let after = ledger.escrows.get_escrow(t).unwrap();
    assert_eq!(after.locked_amount, dec!(30000.00));
    assert_eq!(after.released_amount, dec!(20000.00));
    assert_eq!(ledger.paypal.call_count(), 1);

    let report = ledger.conservation.verify(t).unwrap();
    assert_eq!(report.paid_out, dec!(20000.00));
}

#[test]
fn scenario_c_entry_fee() {
    let ledger = Ledger::new();
    let user = UserId::new();
    let receipt = ledger
        .entry_fees
        .process_entry_fee(user, TournamentId::new(), dec!(25.00), PaymentMethod::Stripe)
        .unwrap();
    assert_eq!(receipt.platform_fee, dec!(1.25));
    assert_eq!(receipt.net_amount, dec!(23.75));

    let rows = ledger.store.transactions(
        &TransactionFilter::new()
            .of_type(TransactionType::EntryFee)
            .with_status(TransactionStatus::Completed),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].from_user_id, Some(user));
    assert_eq!(rows[0].net_amount, rows[0].amount - rows[0].platform_fee);
}

#[test]
fn scenario_d_unclaimed_positions_stay_in_escrow() {
    let ledger = Ledger::new();
    let t = TournamentId::new();
    let structure = DistributionStructure::from_pairs([
        ("1", dec!(0.40)),
        ("2", dec!(0.25)),
        ("3", dec!(0.15)),
        ("4", dec!(0.10)),
        ("5-8", dec!(0.025)),
    ])
    .unwrap();
    let pool = ledger
        .pools
        .create_prize_pool(t, dec!(100000.00), Currency::Usd, structure)
        .unwrap();

    let users: Vec<_> = (0..4)
        .map(|_| ledger.verified_user(PaymentMethod::Paypal))
        .collect();
    let winners: Vec<_> = users
        .iter()
        .zip(1..)
        .map(|(user, position)| Winner::new(*user, position))
        .collect();

    let breakdown = ledger
        .calculator
        .calculate_prize_distribution(pool.id, &winners)
        .unwrap();
    let amounts: Vec<_> = breakdown.entries.iter().map(|e| e.amount).collect();
    assert_eq!(
        amounts,
        vec![dec!(40000.00), dec!(25000.00), dec!(15000.00), dec!(10000.00)]
    );
    assert_eq!(breakdown.total_distributed, dec!(90000.00));

    // Executing the breakdown leaves the unawarded 10000.00 locked.
    ledger.escrows.add_to_escrow(t, dec!(100000.00)).unwrap();
    ledger.pools.activate(pool.id).unwrap();
    let details: HashMap<_, _> = users.iter().map(|u| (*u, paypal())).collect();
    let report = ledger
        .distributor
        .distribute(pool.id, &winners, &details)
        .unwrap();
    assert!(report.all_paid());
    assert_eq!(report.unawarded, dec!(10000.00));

    let escrow = ledger.escrows.get_escrow(t).unwrap();
    assert_eq!(escrow.locked_amount, dec!(10000.00));
    assert_eq!(escrow.released_amount, dec!(90000.00));
    assert_eq!(escrow.status, EscrowStatus::Locked);
    ledger.conservation.verify(t).unwrap();
}

#[test]
fn second_escrow_creation_is_refused() {
    let ledger = Ledger::new();
    let t = TournamentId::new();
    let first = ledger.escrows.create_prize_escrow(t, dec!(1000.00)).unwrap();

    let response = Response::from_result(ledger.escrows.create_prize_escrow(t, dec!(5.00)));
    assert!(!response.is_success());
    assert_eq!(response.code(), Some(ErrorKind::State));
    assert_eq!(ledger.escrows.get_escrow(t).unwrap(), first);
}

#[test]
fn refund_round_trip_keeps_fee() {
    let ledger = Ledger::new();
    let user = UserId::new();
    let charge = ledger
        .entry_fees
        .process_entry_fee(user, TournamentId::new(), dec!(200.00), PaymentMethod::Stripe)
        .unwrap();
    let original = ledger.store.transaction(charge.transaction_id).unwrap();

    let refund = ledger
        .refunds
        .process_refund(charge.transaction_id, "tournament cancelled")
        .unwrap();
    assert_eq!(refund.net_amount, charge.net_amount);
    assert_eq!(refund.retained_fee, dec!(10.00));

    let refund_row = ledger.store.transaction(refund.refund_transaction_id).unwrap();
    assert_eq!(refund_row.net_amount, dec!(190.00));
    assert_eq!(refund_row.to_user_id, Some(user));

    let after = ledger.store.transaction(charge.transaction_id).unwrap();
    assert_eq!(after.status, TransactionStatus::Refunded);
    assert_eq!(after.amount, original.amount);
    assert_eq!(after.platform_fee, original.platform_fee);
    assert_eq!(after.net_amount, original.net_amount);

    // Refunded rows leave the completed-only analytics.
    let report = ledger.analytics.get_financial_analytics(Timeframe::Day);
    assert!(!report.by_type.contains_key(&TransactionType::EntryFee));
    assert_eq!(report.summary.refunds_issued, dec!(190.00));
}

#[test]
fn refunded_payout_still_counts_as_released() {
    let ledger = Ledger::new();
    let t = TournamentId::new();
    let winner = ledger.verified_user(PaymentMethod::Paypal);
    ledger.escrows.create_prize_escrow(t, dec!(500.00)).unwrap();
    let payout = ledger
        .payouts
        .process_prize_payout(winner, t, dec!(200.00), &paypal())
        .unwrap();

    ledger
        .refunds
        .process_refund(payout.transaction_id, "prize forfeited")
        .unwrap();
    let report = ledger.conservation.verify(t).unwrap();
    assert_eq!(report.released_amount, dec!(200.00));
    assert_eq!(report.paid_out, dec!(200.00));
    assert_eq!(ledger.escrows.get_escrow(t).unwrap().locked_amount, dec!(300.00));
}

#[test]
fn funding_gap_reports_unfunded_pledges() {
    let ledger = Ledger::new();
    let t = TournamentId::new();
    let structure = DistributionStructure::from_pairs([("1", dec!(1))]).unwrap();
    let pool = ledger
        .pools
        .create_prize_pool(t, dec!(1000.00), Currency::Usd, structure)
        .unwrap();
    ledger
        .sponsors
        .add_sponsor_contribution(pool.id, SponsorId::new(), "Initech", dec!(500.00), None)
        .unwrap();
    ledger.escrows.add_to_escrow(t, dec!(1200.00)).unwrap();

    let gap = ledger.analytics.funding_gap(pool.id).unwrap();
    assert_eq!(gap.pledged, dec!(1500.00));
    assert_eq!(gap.funded, dec!(1200.00));
    assert_eq!(gap.shortfall, dec!(300.00));
}
