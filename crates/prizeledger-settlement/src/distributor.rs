//! End-of-tournament prize distribution.
//!
//! Computes the breakdown, then pays winners one at a time:
//! 1. Under the prize pool row lock, look for an existing payout for the
//!    (winner, position) slot and record a PENDING `PrizePayout` only when
//!    there is none in flight or completed
//! 2. Execute it through [`PrizePayoutExecutor`]
//! 3. Mark the row COMPLETED with its ledger transaction, or FAILED
//!
//! The pool moves to DISTRIBUTED only once every row has completed.
//! Completed slots are skipped, so re-running after a partial failure only
//! retries what failed, and concurrent runs never pay a slot twice. A slot
//! left PENDING after its ledger transaction completed (the final write
//! was lost) is adopted from that transaction instead of being paid again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx, RowKey, TransactionFilter};
use prizeledger_types::{
    ErrorKind, FinancialTransaction, LedgerConfig, LedgerError, PayoutDetails, PayoutId,
    PayoutStatus, PrizePayout, PrizePool, PrizePoolId, PrizePoolStatus, ProcessorRegistry,
    Result, TournamentId, TransactionId, TransactionMetadata, TransactionStatus,
    TransactionType, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::distribution::{BreakdownEntry, Winner, calculate};
use crate::payout::PrizePayoutExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutLine {
    pub winner_id: UserId,
    pub position: u32,
    pub amount: Decimal,
    pub payout_id: PayoutId,
    pub status: PayoutStatus,
    pub transaction_id: Option<TransactionId>,
    /// Set when the payout completed outside this run.
    pub previously_paid: bool,
    pub error: Option<String>,
    pub error_code: Option<ErrorKind>,
}

impl PayoutLine {
    fn settled(payout: &PrizePayout) -> Self {
        Self {
            winner_id: payout.winner_id,
            position: payout.position,
            amount: payout.amount,
            payout_id: payout.id,
            status: payout.status,
            transaction_id: payout.transaction_id,
            previously_paid: true,
            error: None,
            error_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    pub prize_pool_id: PrizePoolId,
    pub tournament_id: TournamentId,
    pub lines: Vec<PayoutLine>,
    pub total_paid: Decimal,
    pub total_failed: Decimal,
    /// Pool money no winner was entitled to; it stays in escrow.
    pub unawarded: Decimal,
    pub pool_status: PrizePoolStatus,
}

impl DistributionReport {
    #[must_use]
    pub fn all_paid(&self) -> bool {
        self.lines.iter().all(|l| l.status == PayoutStatus::Completed)
    }
}

/// Outcome of the guarded first step for one slot.
enum Claim {
    /// A PENDING payout was recorded for this run to execute.
    Claimed(PayoutId),
    /// The slot is already settled, or was just adopted.
    Settled(PrizePayout),
    /// Another run holds the slot.
    InFlight(PrizePayout),
}

pub struct PrizeDistributor<S> {
    store: Arc<S>,
    executor: PrizePayoutExecutor<S>,
}

impl<S: LedgerStore> PrizeDistributor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, processors: ProcessorRegistry, config: &LedgerConfig) -> Self {
        Self {
            executor: PrizePayoutExecutor::new(Arc::clone(&store), processors, config),
            store,
        }
    }

    /// Pay every awarded winner of an ACTIVE pool.
    ///
    /// # Errors
    /// Fails before any money moves when the pool is missing or not
    /// ACTIVE, the winner list is invalid, or an awarded winner has no
    /// usable payout details (method, pool currency). Individual payout
    /// failures do not abort the run; they are reported per line.
    pub fn distribute(
        &self,
        prize_pool_id: PrizePoolId,
        winners: &[Winner],
        payout_details: &HashMap<UserId, PayoutDetails>,
    ) -> Result<DistributionReport> {
        let pool = self
            .store
            .prize_pool(prize_pool_id)
            .ok_or(LedgerError::PrizePoolNotFound(prize_pool_id))?;
        if pool.status != PrizePoolStatus::Active {
            return Err(LedgerError::PrizePoolClosed {
                id: prize_pool_id,
                status: pool.status,
            });
        }

        let breakdown = calculate(&pool, winners)?;
        for entry in &breakdown.entries {
            let details = payout_details
                .get(&entry.winner_id)
                .ok_or_else(|| LedgerError::InvalidInput {
                    reason: format!("no payout details for winner {}", entry.winner_id),
                })?;
            details.require_method()?;
            if details.currency != pool.currency {
                return Err(LedgerError::CurrencyMismatch {
                    tournament: pool.tournament_id,
                    expected: pool.currency,
                    requested: details.currency,
                });
            }
        }

        let mut lines = Vec::with_capacity(breakdown.entries.len());
        for entry in &breakdown.entries {
            // Validated above.
            let details = payout_details
                .get(&entry.winner_id)
                .ok_or(LedgerError::MissingPayoutMethod)?;
            lines.push(self.pay_one(&pool, entry, details)?);
        }

        let sum = |status: PayoutStatus| -> Decimal {
            lines
                .iter()
                .filter(|l| l.status == status)
                .map(|l| l.amount)
                .sum()
        };
        let mut report = DistributionReport {
            prize_pool_id,
            tournament_id: pool.tournament_id,
            total_paid: sum(PayoutStatus::Completed),
            total_failed: sum(PayoutStatus::Failed),
            unawarded: breakdown.unawarded(),
            pool_status: pool.status,
            lines,
        };

        if report.all_paid() {
            report.pool_status = self.close_pool(prize_pool_id)?;
        }

        tracing::info!(
            pool = %prize_pool_id,
            tournament = %pool.tournament_id,
            paid = %report.total_paid,
            failed = %report.total_failed,
            unawarded = %report.unawarded,
            status = %report.pool_status,
            "Prize distribution run finished"
        );
        Ok(report)
    }

    fn pay_one(
        &self,
        pool: &PrizePool,
        entry: &BreakdownEntry,
        details: &PayoutDetails,
    ) -> Result<PayoutLine> {
        let payout_id = match self.claim(pool, entry, details)? {
            Claim::Claimed(id) => id,
            Claim::Settled(payout) => return Ok(PayoutLine::settled(&payout)),
            Claim::InFlight(payout) => {
                let err = LedgerError::PayoutInFlight(payout.id);
                tracing::warn!(
                    payout = %payout.id,
                    winner = %entry.winner_id,
                    position = entry.position,
                    "Prize payout already in flight; slot skipped"
                );
                return Ok(PayoutLine {
                    previously_paid: false,
                    error: Some(err.to_string()),
                    error_code: Some(err.kind()),
                    ..PayoutLine::settled(&payout)
                });
            }
        };

        let outcome = self.executor.execute(
            entry.winner_id,
            pool.tournament_id,
            entry.amount,
            details,
            Some(entry.position),
        );

        let mut tx = self.store.begin();
        tx.lock(RowKey::PrizePool(pool.id))?;
        let mut payout = tx.lock_payout(payout_id)?;
        let (error, error_code) = match &outcome {
            // Adopted by a concurrent run after our ledger row completed.
            Ok(receipt)
                if payout.status == PayoutStatus::Completed
                    && payout.transaction_id == Some(receipt.transaction_id) =>
            {
                (None, None)
            }
            Ok(receipt) => {
                payout.complete(receipt.transaction_id, Utc::now())?;
                (None, None)
            }
            Err(err) => {
                let transaction = match err {
                    LedgerError::ProcessorFailed { transaction, .. } => Some(*transaction),
                    _ => None,
                };
                payout.fail(transaction, err.to_string())?;
                tracing::warn!(
                    payout = %payout_id,
                    winner = %entry.winner_id,
                    position = entry.position,
                    error = %err,
                    "Prize payout failed"
                );
                (Some(err.to_string()), Some(err.kind()))
            }
        };
        let line = PayoutLine {
            winner_id: entry.winner_id,
            position: entry.position,
            amount: payout.amount,
            payout_id,
            status: payout.status,
            transaction_id: payout.transaction_id,
            previously_paid: false,
            error,
            error_code,
        };
        tx.put_payout(payout);
        tx.commit()?;
        Ok(line)
    }

    /// Unit 1 of a slot: decide, under the pool lock, whether this run may
    /// pay it.
    fn claim(
        &self,
        pool: &PrizePool,
        entry: &BreakdownEntry,
        details: &PayoutDetails,
    ) -> Result<Claim> {
        let mut tx = self.store.begin();
        tx.lock(RowKey::PrizePool(pool.id))?;

        let for_pool = self.store.payouts_for_pool(pool.id);
        let slot: Vec<&PrizePayout> = for_pool
            .iter()
            .filter(|p| p.winner_id == entry.winner_id && p.position == entry.position)
            .collect();
        if let Some(done) = slot.iter().find(|p| p.status == PayoutStatus::Completed) {
            return Ok(Claim::Settled((*done).clone()));
        }
        if let Some(open) = slot
            .iter()
            .find(|p| matches!(p.status, PayoutStatus::Pending | PayoutStatus::Processing))
        {
            let open = (*open).clone();
            let linked: HashSet<TransactionId> =
                for_pool.iter().filter_map(|p| p.transaction_id).collect();
            let Some(row) = self.orphaned_ledger_row(pool, &open, &linked) else {
                return Ok(Claim::InFlight(open));
            };
            let mut payout = tx.lock_payout(open.id)?;
            payout.complete(row.id, row.processed_at.unwrap_or_else(Utc::now))?;
            tx.put_payout(payout.clone());
            tx.commit()?;
            tracing::info!(
                payout = %payout.id,
                transaction = %row.id,
                winner = %entry.winner_id,
                position = entry.position,
                "Adopted completed ledger row for pending prize payout"
            );
            return Ok(Claim::Settled(payout));
        }

        let method = details.require_method()?;
        let payout = PrizePayout::pending(
            pool.id,
            entry.winner_id,
            entry.position,
            entry.amount,
            method,
            details.clone(),
        );
        let payout_id = payout.id;
        tx.put_payout(payout);
        tx.commit()?;
        Ok(Claim::Claimed(payout_id))
    }

    /// A COMPLETED prize payout row for this slot that no payout links to.
    fn orphaned_ledger_row(
        &self,
        pool: &PrizePool,
        payout: &PrizePayout,
        linked: &HashSet<TransactionId>,
    ) -> Option<FinancialTransaction> {
        let filter = TransactionFilter::new()
            .of_type(TransactionType::PrizePayout)
            .with_status(TransactionStatus::Completed)
            .to_user(payout.winner_id);
        self.store.transactions(&filter).into_iter().find(|row| {
            !linked.contains(&row.id)
                && row.amount == payout.amount
                && matches!(
                    row.metadata,
                    TransactionMetadata::PrizePayout { tournament_id, position, .. }
                        if tournament_id == pool.tournament_id
                            && position == Some(payout.position)
                )
        })
    }

    /// Idempotent: a pool closed by a concurrent run stays DISTRIBUTED.
    fn close_pool(&self, prize_pool_id: PrizePoolId) -> Result<PrizePoolStatus> {
        let mut tx = self.store.begin();
        let mut pool = tx.lock_prize_pool(prize_pool_id)?;
        if pool.status == PrizePoolStatus::Distributed {
            return Ok(pool.status);
        }
        pool.transition(PrizePoolStatus::Distributed)?;
        let status = pool.status;
        tx.put_prize_pool(pool);
        tx.commit()?;
        Ok(status)
    }
}
