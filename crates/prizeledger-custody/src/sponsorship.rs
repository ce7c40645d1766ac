//! Sponsor pledges against a prize pool.
//!
//! A contribution grows the pool's nominal `total_prize_amount`. It does
//! not move money into escrow; funding is a separate
//! [`EscrowManager::add_to_escrow`](crate::EscrowManager::add_to_escrow)
//! call, so pledges can run ahead of funding.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx};
use prizeledger_types::money::ensure_positive;
use prizeledger_types::{
    LedgerError, PrizePoolId, Result, SponsorContribution, SponsorId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of recording one pledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionReceipt {
    pub prize_pool_id: PrizePoolId,
    pub contribution: SponsorContribution,
    /// Pool total after the pledge.
    pub total_prize_amount: Decimal,
}

pub struct SponsorshipContributionLedger<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> SponsorshipContributionLedger<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a pledge and grow the pool total in one unit of work.
    ///
    /// # Errors
    /// - `NonPositiveAmount` for a zero or negative pledge.
    /// - `PrizePoolNotFound` if the pool doesn't exist.
    /// - `PrizePoolClosed` once the pool is DISTRIBUTED or CANCELLED.
    pub fn add_sponsor_contribution(
        &self,
        prize_pool_id: PrizePoolId,
        sponsor_id: SponsorId,
        company_name: &str,
        amount: Decimal,
        details: Option<String>,
    ) -> Result<ContributionReceipt> {
        let amount = ensure_positive("amount", amount)?;
        if company_name.trim().is_empty() {
            return Err(LedgerError::InvalidInput {
                reason: "sponsor company name is empty".to_string(),
            });
        }

        let mut tx = self.store.begin();
        let mut pool = tx.lock_prize_pool(prize_pool_id)?;
        let contribution = SponsorContribution {
            sponsor_id,
            company_name: company_name.to_string(),
            amount,
            date: Utc::now(),
            details,
        };
        pool.add_contribution(contribution.clone())?;
        let total_prize_amount = pool.total_prize_amount;
        tx.put_prize_pool(pool);
        tx.commit()?;

        tracing::info!(
            pool = %prize_pool_id,
            sponsor = %sponsor_id,
            amount = %amount,
            total = %total_prize_amount,
            "Sponsor contribution recorded"
        );
        Ok(ContributionReceipt {
            prize_pool_id,
            contribution,
            total_prize_amount,
        })
    }

    /// Every pledge recorded against the pool, oldest first.
    pub fn contributions(&self, prize_pool_id: PrizePoolId) -> Result<Vec<SponsorContribution>> {
        self.store
            .prize_pool(prize_pool_id)
            .map(|pool| pool.sponsor_contributions)
            .ok_or(LedgerError::PrizePoolNotFound(prize_pool_id))
    }
}
