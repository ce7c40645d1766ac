//! Prize payout executor.
//!
//! Moves money out of a tournament escrow to one winner. Two units of
//! work, both holding the escrow row lock:
//!
//! 1. **Reserve**: check escrow status and funds, commit a PENDING
//!    PRIZE_PAYOUT row. Nothing has moved yet.
//! 2. **Execute**: re-check status and funds (another payout may have
//!    committed in between), call the processor with the net amount, then
//!    commit the COMPLETED row, the escrow debit and the account's
//!    `last_used` together. A declined call commits only the FAILED row.
//!
//! Holding the escrow lock across the processor call serializes payouts
//! against the same tournament; payouts against other tournaments proceed
//! independently.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_custody::select_payout_account;
use prizeledger_store::{LedgerStore, LedgerTx, RowKey};
use prizeledger_types::money::ensure_positive;
use prizeledger_types::{
    Currency, EscrowStatus, FinancialTransaction, LedgerConfig, LedgerError, PaymentAccount, PayoutDetails,
    PayoutFeePolicy, PrizeEscrow, ProcessorAdapter, ProcessorRegistry, ProcessorRequest, Result,
    TournamentId, TransactionId, TransactionMetadata, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub external_transaction_id: String,
    pub escrow_locked_amount: Decimal,
    pub escrow_released_amount: Decimal,
}

pub struct PrizePayoutExecutor<S> {
    store: Arc<S>,
    processors: ProcessorRegistry,
    fees: PayoutFeePolicy,
}

impl<S: LedgerStore> PrizePayoutExecutor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, processors: ProcessorRegistry, config: &LedgerConfig) -> Self {
        Self {
            store,
            processors,
            fees: config.payout_fee.clone(),
        }
    }

    /// Pay `amount` (gross) out of the tournament's escrow to the winner.
    ///
    /// # Errors
    /// - `NonPositiveAmount`, `MissingPayoutMethod`, `ProcessorNotConfigured`
    /// - `NoVerifiedAccount` when the winner has no payable account for the method
    /// - `EscrowNotFound`, `EscrowWrongStatus` unless the escrow is LOCKED
    /// - `InsufficientEscrowFunds` when `locked_amount < amount`
    /// - `ProcessorFailed` when the rail declines; the FAILED row is kept
    /// - `LockTimeout` when the escrow stays locked by another unit too long
    pub fn process_prize_payout(
        &self,
        winner_id: UserId,
        tournament_id: TournamentId,
        amount: Decimal,
        payout_details: &PayoutDetails,
    ) -> Result<PayoutReceipt> {
        self.execute(winner_id, tournament_id, amount, payout_details, None)
    }

    pub(crate) fn execute(
        &self,
        winner_id: UserId,
        tournament_id: TournamentId,
        amount: Decimal,
        payout_details: &PayoutDetails,
        position: Option<u32>,
    ) -> Result<PayoutReceipt> {
        let amount = ensure_positive("amount", amount)?;
        let method = payout_details.require_method()?;
        let adapter = self.processors.adapter_for(method)?;
        ensure_payout_currency(self.store.as_ref(), tournament_id, payout_details.currency)?;

        let account = select_payout_account(&self.store.payment_accounts_for_user(winner_id), method)
            .cloned()
            .ok_or(LedgerError::NoVerifiedAccount {
                user: winner_id,
                method,
            })?;

        let transaction_id = self.reserve(
            tournament_id,
            amount,
            payout_details,
            &account,
            adapter.as_ref(),
            position,
        )?;
        self.settle(transaction_id, tournament_id, amount, &account, adapter.as_ref())
    }

    /// Unit 1: funds check and the PENDING row.
    fn reserve(
        &self,
        tournament_id: TournamentId,
        amount: Decimal,
        payout_details: &PayoutDetails,
        account: &PaymentAccount,
        adapter: &dyn ProcessorAdapter,
        position: Option<u32>,
    ) -> Result<TransactionId> {
        let mut tx = self.store.begin();
        let escrow = tx.lock_escrow(tournament_id)?;
        ensure_payable_from(&escrow, amount)?;

        let mut row = FinancialTransaction::pending(
            TransactionMetadata::PrizePayout {
                tournament_id,
                escrow_account_id: escrow.escrow_account_id.clone(),
                payment_account_id: account.id,
                position,
            },
            None,
            Some(account.user_id),
            amount,
            payout_details.currency,
            self.fees.fee_for(amount),
            adapter.name(),
        );
        row.escrow_release_date = Some(escrow.release_date);
        let transaction_id = row.id;
        tx.put_transaction(row);
        tx.commit()?;

        tracing::debug!(
            transaction = %transaction_id,
            tournament = %tournament_id,
            amount = %amount,
            "Prize payout reserved"
        );
        Ok(transaction_id)
    }

    /// Unit 2: re-check, call the rail, record the outcome.
    fn settle(
        &self,
        transaction_id: TransactionId,
        tournament_id: TournamentId,
        amount: Decimal,
        account: &PaymentAccount,
        adapter: &dyn ProcessorAdapter,
    ) -> Result<PayoutReceipt> {
        let mut tx = self.store.begin();
        let mut escrow = tx.lock_escrow(tournament_id)?;
        let mut row = tx.lock_transaction(transaction_id)?;
        tx.lock(RowKey::PaymentAccount(account.id))?;
        let now = Utc::now();

        // The escrow or the account may have changed since the reservation.
        let recheck = ensure_payable_from(&escrow, amount).and_then(|()| {
            tx.payment_account(account.id)
                .ok_or(LedgerError::PaymentAccountNotFound(account.id))?
                .ensure_payable()
        });
        if let Err(err) = recheck {
            row.fail(err.to_string(), now)?;
            tx.put_transaction(row);
            tx.commit()?;
            tracing::warn!(
                transaction = %transaction_id,
                tournament = %tournament_id,
                error = %err,
                "Prize payout lost its reservation"
            );
            return Err(err);
        }

        row.mark_processing()?;
        let request = ProcessorRequest {
            reference: transaction_id,
            amount: row.net_amount,
            currency: row.currency,
            account_ref: account.account_identifier.clone(),
        };
        match adapter.submit_payout(&request) {
            Ok(receipt) => {
                row.complete(receipt.external_transaction_id.clone(), now)?;
                escrow.release(amount)?;
                let mut paid_account = tx
                    .payment_account(account.id)
                    .ok_or(LedgerError::PaymentAccountNotFound(account.id))?;
                paid_account.last_used = Some(now);

                let result = PayoutReceipt {
                    transaction_id,
                    amount: row.amount,
                    platform_fee: row.platform_fee,
                    net_amount: row.net_amount,
                    external_transaction_id: receipt.external_transaction_id,
                    escrow_locked_amount: escrow.locked_amount,
                    escrow_released_amount: escrow.released_amount,
                };
                tx.put_transaction(row);
                tx.put_escrow(escrow);
                tx.put_payment_account(paid_account);
                if let Err(err) = tx.commit() {
                    tracing::error!(
                        transaction = %transaction_id,
                        external = %result.external_transaction_id,
                        error = %err,
                        "Processor paid out but the ledger commit failed; row left PENDING for reconciliation"
                    );
                    return Err(err);
                }

                tracing::info!(
                    transaction = %transaction_id,
                    tournament = %tournament_id,
                    winner = %account.user_id,
                    amount = %result.amount,
                    fee = %result.platform_fee,
                    locked = %result.escrow_locked_amount,
                    "Prize payout completed"
                );
                Ok(result)
            }
            Err(failure) => {
                row.fail(failure.reason.clone(), now)?;
                tx.put_transaction(row);
                tx.commit()?;
                tracing::warn!(
                    transaction = %transaction_id,
                    tournament = %tournament_id,
                    processor = adapter.name(),
                    reason = %failure,
                    "Prize payout declined"
                );
                Err(LedgerError::ProcessorFailed {
                    processor: adapter.name().to_string(),
                    transaction: transaction_id,
                    reason: failure.reason,
                })
            }
        }
    }
}

/// The tournament's prize pool fixes the payout currency (default when it
/// has no pool).
pub(crate) fn ensure_payout_currency<S: LedgerStore>(
    store: &S,
    tournament_id: TournamentId,
    requested: Currency,
) -> Result<()> {
    let expected = store
        .prize_pool_for_tournament(tournament_id)
        .map_or_else(Currency::default, |pool| pool.currency);
    if requested != expected {
        return Err(LedgerError::CurrencyMismatch {
            tournament: tournament_id,
            expected,
            requested,
        });
    }
    Ok(())
}

fn ensure_payable_from(escrow: &PrizeEscrow, amount: Decimal) -> Result<()> {
    escrow.ensure_status(EscrowStatus::Locked)?;
    if escrow.locked_amount < amount {
        tracing::warn!(
            tournament = %escrow.tournament_id,
            requested = %amount,
            locked = %escrow.locked_amount,
            "Insufficient escrow funds"
        );
        return Err(LedgerError::InsufficientEscrowFunds {
            tournament: escrow.tournament_id,
            requested: amount,
            locked: escrow.locked_amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prizeledger_custody::{EscrowManager, PaymentAccountRegistry, PrizePoolManager};
    use prizeledger_store::InMemoryLedgerStore;
    use prizeledger_types::{
        DistributionStructure, ErrorKind, FakeBehavior, FakeProcessor, PaymentMethod,
        TransactionStatus,
    };
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        executor: PrizePayoutExecutor<InMemoryLedgerStore>,
        paypal: Arc<FakeProcessor>,
        tournament: TournamentId,
        winner: UserId,
    }

    fn fixture(escrow_total: Decimal) -> Fixture {
        let config = LedgerConfig::default();
        let store = Arc::new(InMemoryLedgerStore::with_config(&config));
        let paypal = Arc::new(FakeProcessor::approving("paypal"));
        let registry = ProcessorRegistry::new().with(PaymentMethod::Paypal, paypal.clone());

        let tournament = TournamentId::new();
        EscrowManager::new(Arc::clone(&store), &config)
            .create_prize_escrow(tournament, escrow_total)
            .unwrap();

        let winner = UserId::new();
        let accounts = PaymentAccountRegistry::new(Arc::clone(&store));
        let account = accounts
            .register_account(winner, PaymentMethod::Paypal, "winner@example.com", vec![])
            .unwrap();
        accounts.verify_account(account.id).unwrap();

        Fixture {
            executor: PrizePayoutExecutor::new(Arc::clone(&store), registry, &config),
            store,
            paypal,
            tournament,
            winner,
        }
    }

    fn paypal() -> PayoutDetails {
        PayoutDetails::via(PaymentMethod::Paypal, Currency::Usd)
    }

    #[test]
    fn payout_debits_escrow_and_caps_fee() {
        let f = fixture(dec!(50000.00));
        let receipt = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(20000.00), &paypal())
            .unwrap();
        assert_eq!(receipt.platform_fee, dec!(100.00));
        assert_eq!(receipt.net_amount, dec!(19900.00));
        assert_eq!(receipt.escrow_locked_amount, dec!(30000.00));
        assert_eq!(receipt.escrow_released_amount, dec!(20000.00));

        // The rail is sent the net amount to the verified destination.
        let call = &f.paypal.calls()[0];
        assert_eq!(call.request.amount, dec!(19900.00));
        assert_eq!(call.request.account_ref, "winner@example.com");

        let row = f.store.transaction(receipt.transaction_id).unwrap();
        assert_eq!(row.status, TransactionStatus::Completed);
        assert_eq!(row.to_user_id, Some(f.winner));
        assert!(row.escrow_release_date.is_some());

        let account = &f.store.payment_accounts_for_user(f.winner)[0];
        assert!(account.last_used.is_some());
    }

    #[test]
    fn small_payout_fee_is_two_percent() {
        let f = fixture(dec!(1000.00));
        let receipt = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(123.45), &paypal())
            .unwrap();
        // 123.45 * 0.02 = 2.469
        assert_eq!(receipt.platform_fee, dec!(2.47));
        assert_eq!(receipt.net_amount, dec!(120.98));
    }

    #[test]
    fn insufficient_funds_leaves_escrow_and_ledger_untouched() {
        let f = fixture(dec!(100.00));
        let err = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(100.01), &paypal())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(f.store.escrow(f.tournament).unwrap().locked_amount, dec!(100.00));
        assert_eq!(f.store.transaction_count(), 0);
        assert_eq!(f.paypal.call_count(), 0);
    }

    #[test]
    fn decline_keeps_failed_row_and_escrow() {
        let f = fixture(dec!(500.00));
        f.paypal
            .set_behavior(FakeBehavior::Decline("account_frozen".into()));
        let err = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(200.00), &paypal())
            .unwrap_err();
        let LedgerError::ProcessorFailed { transaction, .. } = err else {
            panic!("expected processor failure, got {err}");
        };
        let row = f.store.transaction(transaction).unwrap();
        assert_eq!(row.status, TransactionStatus::Failed);
        assert_eq!(row.failure_reason.as_deref(), Some("account_frozen"));

        let escrow = f.store.escrow(f.tournament).unwrap();
        assert_eq!(escrow.locked_amount, dec!(500.00));
        assert_eq!(escrow.released_amount, dec!(0));
    }

    #[test]
    fn draining_escrow_completes_it() {
        let f = fixture(dec!(300.00));
        f.executor
            .process_prize_payout(f.winner, f.tournament, dec!(300.00), &paypal())
            .unwrap();
        let escrow = f.store.escrow(f.tournament).unwrap();
        assert_eq!(escrow.status, EscrowStatus::Completed);

        let err = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(1.00), &paypal())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn disputed_escrow_blocks_payouts() {
        let f = fixture(dec!(300.00));
        EscrowManager::new(Arc::clone(&f.store), &LedgerConfig::default())
            .open_dispute(f.tournament, "collusion report")
            .unwrap();
        let err = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(10.00), &paypal())
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::EscrowWrongStatus {
                status: EscrowStatus::Disputed,
                ..
            }
        ));
    }

    #[test]
    fn precondition_errors() {
        let f = fixture(dec!(300.00));

        let err = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(10.00), &PayoutDetails::default())
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingPayoutMethod));

        let err = f
            .executor
            .process_prize_payout(UserId::new(), f.tournament, dec!(10.00), &paypal())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f
            .executor
            .process_prize_payout(f.winner, TournamentId::new(), dec!(10.00), &paypal())
            .unwrap_err();
        assert!(matches!(err, LedgerError::EscrowNotFound(_)));

        let err = f
            .executor
            .process_prize_payout(
                f.winner,
                f.tournament,
                dec!(10.00),
                &PayoutDetails::via(PaymentMethod::Stripe, Currency::Usd),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProcessorNotConfigured(_)));
        assert_eq!(f.store.transaction_count(), 0);
    }

    #[test]
    fn payout_currency_must_match_pool() {
        let f = fixture(dec!(100.00));
        let pools = PrizePoolManager::new(Arc::clone(&f.store));
        let structure = DistributionStructure::from_pairs([("1", dec!(1.0))]).unwrap();
        pools
            .create_prize_pool(f.tournament, dec!(100.00), Currency::Usd, structure)
            .unwrap();

        let err = f
            .executor
            .process_prize_payout(
                f.winner,
                f.tournament,
                dec!(100.00),
                &PayoutDetails::via(PaymentMethod::Paypal, Currency::Eur),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CurrencyMismatch {
                expected: Currency::Usd,
                requested: Currency::Eur,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.paypal.call_count(), 0);
        assert_eq!(f.store.transaction_count(), 0);
        assert_eq!(f.store.escrow(f.tournament).unwrap().locked_amount, dec!(100.00));

        let receipt = f
            .executor
            .process_prize_payout(f.winner, f.tournament, dec!(100.00), &paypal())
            .unwrap();
        let row = f.store.transaction(receipt.transaction_id).unwrap();
        assert_eq!(row.currency, Currency::Usd);
    }

    #[test]
    fn payout_without_pool_uses_default_currency() {
        let f = fixture(dec!(100.00));
        let err = f
            .executor
            .process_prize_payout(
                f.winner,
                f.tournament,
                dec!(10.00),
                &PayoutDetails::via(PaymentMethod::Paypal, Currency::Gbp),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.paypal.call_count(), 0);
    }
}
