//! Entry fee collection.
//!
//! Two units of work per charge:
//! 1. The PENDING ledger row is committed before the processor is called,
//!    so a charge is never attempted without a durable record.
//! 2. The processor outcome moves the row to COMPLETED or FAILED.
//!
//! A declined charge still leaves its FAILED row behind.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx};
use prizeledger_types::money::ensure_positive;
use prizeledger_types::{
    Currency, EntryFeePolicy, FinancialTransaction, LedgerConfig, LedgerError, PaymentMethod,
    ProcessorRegistry, ProcessorRequest, Result, TournamentId, TransactionId,
    TransactionMetadata, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payload returned for a completed charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFeeReceipt {
    pub transaction_id: TransactionId,
    pub net_amount: Decimal,
    pub platform_fee: Decimal,
    pub external_transaction_id: String,
}

pub struct EntryFeeProcessor<S> {
    store: Arc<S>,
    processors: ProcessorRegistry,
    policy: EntryFeePolicy,
}

impl<S: LedgerStore> EntryFeeProcessor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, processors: ProcessorRegistry, config: &LedgerConfig) -> Self {
        Self {
            store,
            processors,
            policy: config.entry_fee.clone(),
        }
    }

    /// Charge `amount` to the user for entering the tournament.
    ///
    /// # Errors
    /// - `NonPositiveAmount` / `AmountOutOfRange` outside `(0, max_amount]`.
    /// - `UnsupportedPaymentMethod` for methods not accepted for entry.
    /// - `ProcessorNotConfigured` when no rail is registered for the method.
    /// - `ProcessorFailed` when the rail declines; the FAILED row is kept.
    pub fn process_entry_fee(
        &self,
        user_id: UserId,
        tournament_id: TournamentId,
        amount: Decimal,
        payment_method: PaymentMethod,
    ) -> Result<EntryFeeReceipt> {
        // 1. Validate
        let amount = ensure_positive("amount", amount)?;
        if amount > self.policy.max_amount {
            return Err(LedgerError::AmountOutOfRange {
                amount,
                min: Decimal::ZERO,
                max: self.policy.max_amount,
            });
        }
        if !payment_method.accepts_entry_fees() {
            return Err(LedgerError::UnsupportedPaymentMethod(payment_method));
        }
        let adapter = self.processors.adapter_for(payment_method)?;

        // 2. Persist the PENDING row
        let currency = self
            .store
            .prize_pool_for_tournament(tournament_id)
            .map_or_else(Currency::default, |pool| pool.currency);
        let platform_fee = self.policy.fee_for(amount);
        let row = FinancialTransaction::pending(
            TransactionMetadata::EntryFee {
                tournament_id,
                payment_method,
            },
            Some(user_id),
            None,
            amount,
            currency,
            platform_fee,
            adapter.name(),
        );
        let transaction_id = row.id;
        let mut tx = self.store.begin();
        tx.put_transaction(row.clone());
        tx.commit()?;

        // 3. Charge the user
        let request = ProcessorRequest {
            reference: transaction_id,
            amount: row.amount,
            currency,
            account_ref: self.source_account_ref(user_id, payment_method),
        };
        let outcome = adapter.submit_payment(&request);

        // 4. Record the outcome
        let mut tx = self.store.begin();
        let mut row = tx.lock_transaction(transaction_id)?;
        row.mark_processing()?;
        let now = Utc::now();
        match outcome {
            Ok(receipt) => {
                row.complete(receipt.external_transaction_id.clone(), now)?;
                tx.put_transaction(row.clone());
                tx.commit()?;
                tracing::info!(
                    transaction = %transaction_id,
                    user = %user_id,
                    tournament = %tournament_id,
                    amount = %row.amount,
                    fee = %row.platform_fee,
                    processor = adapter.name(),
                    "Entry fee collected"
                );
                Ok(EntryFeeReceipt {
                    transaction_id,
                    net_amount: row.net_amount,
                    platform_fee: row.platform_fee,
                    external_transaction_id: receipt.external_transaction_id,
                })
            }
            Err(failure) => {
                row.fail(failure.reason.clone(), now)?;
                tx.put_transaction(row);
                tx.commit()?;
                tracing::warn!(
                    transaction = %transaction_id,
                    user = %user_id,
                    processor = adapter.name(),
                    reason = %failure,
                    "Entry fee declined"
                );
                Err(LedgerError::ProcessorFailed {
                    processor: adapter.name().to_string(),
                    transaction: transaction_id,
                    reason: failure.reason,
                })
            }
        }
    }

    /// The user's active account on this rail, or their user id when the
    /// rail resolves the payer itself.
    fn source_account_ref(&self, user_id: UserId, method: PaymentMethod) -> String {
        self.store
            .payment_accounts_for_user(user_id)
            .into_iter()
            .filter(|a| a.payment_method == method && a.is_active)
            .min_by_key(|a| (!a.is_primary, a.created_at))
            .map_or_else(|| user_id.to_string(), |a| a.account_identifier)
    }
}
