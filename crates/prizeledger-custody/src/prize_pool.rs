//! Prize pool lifecycle: creation, activation, distribution, cancellation.

use std::sync::Arc;

use prizeledger_store::{LedgerStore, LedgerTx};
use prizeledger_types::{
    Currency, DistributionStructure, LedgerError, PrizePool, PrizePoolId, PrizePoolStatus,
    Result, TournamentId,
};
use rust_decimal::Decimal;

pub struct PrizePoolManager<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> PrizePoolManager<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the tournament's pool in PENDING. A zero total is allowed;
    /// sponsors may pledge the whole pool later.
    pub fn create_prize_pool(
        &self,
        tournament_id: TournamentId,
        total_prize_amount: Decimal,
        currency: Currency,
        distribution_structure: DistributionStructure,
    ) -> Result<PrizePool> {
        if total_prize_amount < Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount {
                field: "total_prize_amount",
                amount: total_prize_amount,
            });
        }

        let mut tx = self.store.begin();
        if tx.prize_pool_for_tournament(tournament_id).is_some() {
            return Err(LedgerError::PrizePoolAlreadyExists(tournament_id));
        }
        let pool = PrizePool::new(
            tournament_id,
            total_prize_amount,
            currency,
            distribution_structure,
        );
        tx.put_prize_pool(pool.clone());
        // Concurrent creators race to the unique index; the loser gets
        // PrizePoolAlreadyExists from commit.
        tx.commit()?;

        tracing::info!(
            tournament = %tournament_id,
            pool = %pool.id,
            total = %pool.total_prize_amount,
            currency = %currency,
            "Prize pool created"
        );
        Ok(pool)
    }

    pub fn get_prize_pool(&self, id: PrizePoolId) -> Result<PrizePool> {
        self.store
            .prize_pool(id)
            .ok_or(LedgerError::PrizePoolNotFound(id))
    }

    pub fn prize_pool_for_tournament(&self, tournament_id: TournamentId) -> Result<PrizePool> {
        self.store
            .prize_pool_for_tournament(tournament_id)
            .ok_or(LedgerError::NoPrizePoolForTournament(tournament_id))
    }

    pub fn activate(&self, id: PrizePoolId) -> Result<PrizePool> {
        self.transition(id, PrizePoolStatus::Active)
    }

    pub fn cancel(&self, id: PrizePoolId) -> Result<PrizePool> {
        self.transition(id, PrizePoolStatus::Cancelled)
    }

    pub fn mark_distributed(&self, id: PrizePoolId) -> Result<PrizePool> {
        self.transition(id, PrizePoolStatus::Distributed)
    }

    /// Record the tournament's escrow account on the pool.
    pub fn attach_escrow(&self, id: PrizePoolId) -> Result<PrizePool> {
        let mut tx = self.store.begin();
        let mut pool = tx.lock_prize_pool(id)?;
        let escrow = tx
            .escrow(pool.tournament_id)
            .ok_or(LedgerError::EscrowNotFound(pool.tournament_id))?;
        pool.escrow_account_id = Some(escrow.escrow_account_id.clone());
        tx.put_prize_pool(pool.clone());
        tx.commit()?;

        tracing::debug!(pool = %id, account = %escrow.escrow_account_id, "Escrow attached to pool");
        Ok(pool)
    }

    fn transition(&self, id: PrizePoolId, target: PrizePoolStatus) -> Result<PrizePool> {
        let mut tx = self.store.begin();
        let mut pool = tx.lock_prize_pool(id)?;
        let from = pool.status;
        if let Err(err) = pool.transition(target) {
            tracing::warn!(pool = %id, %from, to = %target, "Rejected prize pool transition");
            return Err(err);
        }
        tx.put_prize_pool(pool.clone());
        tx.commit()?;

        tracing::info!(pool = %id, %from, to = %target, "Prize pool status changed");
        Ok(pool)
    }
}
