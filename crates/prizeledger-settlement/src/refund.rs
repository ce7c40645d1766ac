//! Refunds of completed ledger rows.
//!
//! A refund appends a new REFUND row flowing the opposite way and moves the
//! original from COMPLETED to REFUNDED. The original keeps its amount and
//! fee; only its status changes. The platform fee is not returned: the
//! refund row carries the original's net amount with a zero fee.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx};
use prizeledger_types::constants::MIN_TRANSACTION_AMOUNT;
use prizeledger_types::{
    FinancialTransaction, LedgerError, Result, TransactionId, TransactionMetadata,
    TransactionStatus, TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    pub refund_transaction_id: TransactionId,
    pub original_transaction_id: TransactionId,
    pub net_amount: Decimal,
    /// Fee the platform kept from the original.
    pub retained_fee: Decimal,
}

pub struct RefundProcessor<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> RefundProcessor<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// # Errors
    /// - `TransactionNotFound` for an unknown id.
    /// - `TransactionNotCompleted` unless the original is COMPLETED.
    /// - `InvalidInput` for an empty reason, a REFUND original, or an
    ///   original whose net amount is below the ledger minimum.
    pub fn process_refund(
        &self,
        original_transaction_id: TransactionId,
        reason: &str,
    ) -> Result<RefundReceipt> {
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidInput {
                reason: "refund reason is empty".to_string(),
            });
        }

        let mut tx = self.store.begin();
        let mut original = tx.lock_transaction(original_transaction_id)?;
        if original.status != TransactionStatus::Completed {
            tracing::warn!(
                transaction = %original_transaction_id,
                status = %original.status,
                "Refund refused: original not completed"
            );
            return Err(LedgerError::TransactionNotCompleted {
                id: original_transaction_id,
                status: original.status,
            });
        }
        if original.transaction_type() == TransactionType::Refund {
            return Err(LedgerError::InvalidInput {
                reason: format!("{original_transaction_id} is itself a refund"),
            });
        }
        if original.net_amount < MIN_TRANSACTION_AMOUNT {
            return Err(LedgerError::InvalidInput {
                reason: format!(
                    "{original_transaction_id} has net amount {} and nothing to refund",
                    original.net_amount
                ),
            });
        }

        let mut refund = FinancialTransaction::pending(
            TransactionMetadata::Refund {
                original_transaction_id,
                reason: reason.to_string(),
            },
            original.to_user_id,
            original.from_user_id,
            original.net_amount,
            original.currency,
            Decimal::ZERO,
            original.payment_processor.clone(),
        );
        // Settled internally; no processor leg.
        refund.mark_processing()?;
        refund.transition(TransactionStatus::Completed)?;
        refund.processed_at = Some(Utc::now());
        original.mark_refunded()?;

        let receipt = RefundReceipt {
            refund_transaction_id: refund.id,
            original_transaction_id,
            net_amount: refund.net_amount,
            retained_fee: original.platform_fee,
        };
        tx.put_transaction(refund);
        tx.put_transaction(original);
        tx.commit()?;

        tracing::info!(
            refund = %receipt.refund_transaction_id,
            original = %original_transaction_id,
            amount = %receipt.net_amount,
            retained_fee = %receipt.retained_fee,
            "Refund recorded"
        );
        Ok(receipt)
    }
}
