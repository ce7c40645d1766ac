//! Prize distribution calculator.
//!
//! ```text
//! amount(position) = round_cents(total_prize_amount * share(position))
//! ```
//!
//! Positions without a configured share, and shares that round to zero,
//! produce no entry. The breakdown never tops up the awarded positions
//! with an unawarded remainder.

use std::collections::HashSet;
use std::sync::Arc;

use prizeledger_store::LedgerStore;
use prizeledger_types::money::round_cents;
use prizeledger_types::{LedgerError, PrizePool, PrizePoolId, Result, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A finishing position supplied by the bracket subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub user_id: UserId,
    pub position: u32,
}

impl Winner {
    #[must_use]
    pub fn new(user_id: UserId, position: u32) -> Self {
        Self { user_id, position }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    pub winner_id: UserId,
    pub position: u32,
    pub share: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBreakdown {
    pub prize_pool_id: PrizePoolId,
    pub total_prize_amount: Decimal,
    /// Ordered by position.
    pub entries: Vec<BreakdownEntry>,
    pub total_distributed: Decimal,
}

impl DistributionBreakdown {
    /// Pool money no entry claims. Stays in escrow.
    #[must_use]
    pub fn unawarded(&self) -> Decimal {
        self.total_prize_amount - self.total_distributed
    }
}

/// Compute the breakdown for `winners` against an already loaded pool.
pub fn calculate(pool: &PrizePool, winners: &[Winner]) -> Result<DistributionBreakdown> {
    let mut seen = HashSet::with_capacity(winners.len());
    for winner in winners {
        if winner.position == 0 {
            return Err(LedgerError::InvalidInput {
                reason: "finishing positions start at 1".to_string(),
            });
        }
        if !seen.insert(winner.position) {
            return Err(LedgerError::InvalidInput {
                reason: format!("position {} assigned twice", winner.position),
            });
        }
    }

    let mut ordered = winners.to_vec();
    ordered.sort_by_key(|w| w.position);

    let entries: Vec<BreakdownEntry> = ordered
        .into_iter()
        .filter_map(|winner| {
            let share = pool.distribution_structure.share_for(winner.position)?;
            let amount = round_cents(pool.total_prize_amount * share);
            (amount > Decimal::ZERO).then_some(BreakdownEntry {
                winner_id: winner.user_id,
                position: winner.position,
                share,
                amount,
            })
        })
        .collect();
    let total_distributed = entries.iter().map(|e| e.amount).sum();

    Ok(DistributionBreakdown {
        prize_pool_id: pool.id,
        total_prize_amount: pool.total_prize_amount,
        entries,
        total_distributed,
    })
}

/// Read-only: turns a pool's distribution structure and a winner list
/// into concrete amounts.
pub struct PrizeDistributionCalculator<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> PrizeDistributionCalculator<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn calculate_prize_distribution(
        &self,
        prize_pool_id: PrizePoolId,
        winners: &[Winner],
    ) -> Result<DistributionBreakdown> {
        let pool = self
            .store
            .prize_pool(prize_pool_id)
            .ok_or(LedgerError::PrizePoolNotFound(prize_pool_id))?;
        let breakdown = calculate(&pool, winners)?;
        tracing::debug!(
            pool = %prize_pool_id,
            winners = winners.len(),
            entries = breakdown.entries.len(),
            distributed = %breakdown.total_distributed,
            "Prize distribution calculated"
        );
        Ok(breakdown)
    }
}
