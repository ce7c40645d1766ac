//! Escrow manager.
//!
//! One escrow per tournament holds the prize money that has actually been
//! funded. Creation is idempotency-guarded; funding takes the escrow row
//! lock and grows `total_amount` and `locked_amount` together inside a
//! single unit of work.

use std::sync::Arc;

use chrono::Utc;
use prizeledger_store::{LedgerStore, LedgerTx, RowKey};
use prizeledger_types::money::ensure_positive;
use prizeledger_types::{
    EscrowStatus, LedgerConfig, LedgerError, PrizeEscrow, Result, TournamentId,
};
use rust_decimal::Decimal;

pub struct EscrowManager<S> {
    store: Arc<S>,
    release_after_days: i64,
}

impl<S: LedgerStore> EscrowManager<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            release_after_days: config.escrow_release_days,
        }
    }

    /// Open the tournament's escrow with everything locked.
    ///
    /// # Errors
    /// - `EscrowAlreadyExists` if the tournament already has one; the
    ///   existing escrow is left untouched.
    /// - `NonPositiveAmount` for a zero or negative total.
    pub fn create_prize_escrow(
        &self,
        tournament_id: TournamentId,
        total_amount: Decimal,
    ) -> Result<PrizeEscrow> {
        let total_amount = ensure_positive("total_amount", total_amount)?;
        let mut tx = self.store.begin();
        tx.lock(RowKey::Escrow(tournament_id))?;
        if tx.escrow(tournament_id).is_some() {
            tracing::warn!(tournament = %tournament_id, "Escrow already exists");
            return Err(LedgerError::EscrowAlreadyExists(tournament_id));
        }
        let escrow = self.stage_new(&mut tx, tournament_id, total_amount);
        tx.commit()?;

        tracing::info!(
            tournament = %tournament_id,
            account = %escrow.escrow_account_id,
            amount = %escrow.total_amount,
            "Prize escrow created"
        );
        Ok(escrow)
    }

    /// Fund the tournament's escrow, creating it on first use.
    pub fn add_to_escrow(
        &self,
        tournament_id: TournamentId,
        amount: Decimal,
    ) -> Result<PrizeEscrow> {
        let amount = ensure_positive("amount", amount)?;
        let mut tx = self.store.begin();
        tx.lock(RowKey::Escrow(tournament_id))?;

        let escrow = match tx.escrow(tournament_id) {
            None => self.stage_new(&mut tx, tournament_id, amount),
            Some(mut escrow) => {
                // A completed escrow has been paid out in full and is closed.
                if escrow.status == EscrowStatus::Completed {
                    return Err(LedgerError::EscrowWrongStatus {
                        tournament: tournament_id,
                        status: escrow.status,
                        expected: EscrowStatus::Locked,
                    });
                }
                escrow.fund(amount);
                tx.put_escrow(escrow.clone());
                escrow
            }
        };
        tx.commit()?;

        tracing::info!(
            tournament = %tournament_id,
            amount = %amount,
            locked = %escrow.locked_amount,
            total = %escrow.total_amount,
            "Escrow funded"
        );
        Ok(escrow)
    }

    pub fn get_escrow(&self, tournament_id: TournamentId) -> Result<PrizeEscrow> {
        self.store
            .escrow(tournament_id)
            .ok_or(LedgerError::EscrowNotFound(tournament_id))
    }

    /// Freeze payouts while a dispute is open.
    pub fn open_dispute(
        &self,
        tournament_id: TournamentId,
        details: &str,
    ) -> Result<PrizeEscrow> {
        if details.trim().is_empty() {
            return Err(LedgerError::InvalidInput {
                reason: "dispute details are empty".to_string(),
            });
        }
        let escrow = self.update(tournament_id, |escrow| escrow.open_dispute(details))?;
        tracing::warn!(tournament = %tournament_id, details, "Escrow disputed");
        Ok(escrow)
    }

    pub fn resolve_dispute(&self, tournament_id: TournamentId) -> Result<PrizeEscrow> {
        let escrow = self.update(tournament_id, PrizeEscrow::resolve_dispute)?;
        tracing::info!(tournament = %tournament_id, "Escrow dispute resolved");
        Ok(escrow)
    }

    fn update(
        &self,
        tournament_id: TournamentId,
        apply: impl FnOnce(&mut PrizeEscrow) -> Result<()>,
    ) -> Result<PrizeEscrow> {
        let mut tx = self.store.begin();
        let mut escrow = tx.lock_escrow(tournament_id)?;
        apply(&mut escrow)?;
        tx.put_escrow(escrow.clone());
        tx.commit()?;
        Ok(escrow)
    }

    fn stage_new(
        &self,
        tx: &mut impl LedgerTx,
        tournament_id: TournamentId,
        total_amount: Decimal,
    ) -> PrizeEscrow {
        let escrow = PrizeEscrow::locked(
            tournament_id,
            total_amount,
            self.release_after_days,
            Utc::now(),
        );
        tx.put_escrow(escrow.clone());
        escrow
    }
}
