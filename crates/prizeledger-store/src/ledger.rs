//! The ledger store interface.
//!
//! Components receive a [`LedgerStore`] by injection and never touch
//! storage any other way. Every mutation happens inside a [`LedgerTx`]:
//! reads see the unit's own staged writes, nothing is visible elsewhere
//! until [`LedgerTx::commit`], and dropping an uncommitted unit rolls it
//! back and releases its row locks.

use chrono::{DateTime, Utc};
use prizeledger_types::{
    FinancialTransaction, LedgerError, PaymentAccount, PaymentAccountId, PayoutId, PrizeEscrow,
    PrizePayout, PrizePool, PrizePoolId, Result, TournamentId, TransactionId, TransactionStatus,
    TransactionType, UserId,
};

use crate::row_lock::RowKey;

/// Query over committed ledger rows. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub statuses: Vec<TransactionStatus>,
    pub from_user: Option<UserId>,
    pub to_user: Option<UserId>,
    pub external_transaction_id: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    #[must_use]
    pub fn from_user(mut self, user: UserId) -> Self {
        self.from_user = Some(user);
        self
    }

    #[must_use]
    pub fn to_user(mut self, user: UserId) -> Self {
        self.to_user = Some(user);
        self
    }

    #[must_use]
    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.external_transaction_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn created_between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_until = Some(until);
        self
    }

    #[must_use]
    pub fn matches(&self, tx: &FinancialTransaction) -> bool {
        self.transaction_type
            .is_none_or(|t| tx.transaction_type() == t)
            && (self.statuses.is_empty() || self.statuses.contains(&tx.status))
            && self.from_user.is_none_or(|u| tx.from_user_id == Some(u))
            && self.to_user.is_none_or(|u| tx.to_user_id == Some(u))
            && self
                .external_transaction_id
                .as_ref()
                .is_none_or(|e| tx.external_transaction_id.as_ref() == Some(e))
            && self.created_from.is_none_or(|t| tx.created_at >= t)
            && self.created_until.is_none_or(|t| tx.created_at < t)
    }
}

/// One atomic unit of work.
pub trait LedgerTx {
    /// Exclusive row lock held until commit or rollback.
    fn lock(&mut self, key: RowKey) -> Result<()>;

    fn payment_account(&self, id: PaymentAccountId) -> Option<PaymentAccount>;
    fn payment_accounts_for_user(&self, user: UserId) -> Vec<PaymentAccount>;
    fn put_payment_account(&mut self, account: PaymentAccount);

    fn transaction(&self, id: TransactionId) -> Option<FinancialTransaction>;
    fn put_transaction(&mut self, tx: FinancialTransaction);

    fn escrow(&self, tournament: TournamentId) -> Option<PrizeEscrow>;
    fn put_escrow(&mut self, escrow: PrizeEscrow);

    fn prize_pool(&self, id: PrizePoolId) -> Option<PrizePool>;
    fn prize_pool_for_tournament(&self, tournament: TournamentId) -> Option<PrizePool>;
    fn put_prize_pool(&mut self, pool: PrizePool);

    fn payout(&self, id: PayoutId) -> Option<PrizePayout>;
    fn put_payout(&mut self, payout: PrizePayout);

    /// Run pre-commit invariant checks and publish all staged writes.
    fn commit(self) -> Result<()>
    where
        Self: Sized;

    // ---------------------------------------------------------------
    // Lock-then-read helpers
    // ---------------------------------------------------------------

    fn lock_escrow(&mut self, tournament: TournamentId) -> Result<PrizeEscrow> {
        self.lock(RowKey::Escrow(tournament))?;
        self.escrow(tournament)
            .ok_or(LedgerError::EscrowNotFound(tournament))
    }

    fn lock_prize_pool(&mut self, id: PrizePoolId) -> Result<PrizePool> {
        self.lock(RowKey::PrizePool(id))?;
        self.prize_pool(id).ok_or(LedgerError::PrizePoolNotFound(id))
    }

    fn lock_transaction(&mut self, id: TransactionId) -> Result<FinancialTransaction> {
        self.lock(RowKey::Transaction(id))?;
        self.transaction(id)
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    fn lock_payment_account(&mut self, id: PaymentAccountId) -> Result<PaymentAccount> {
        self.lock(RowKey::PaymentAccount(id))?;
        self.payment_account(id)
            .ok_or(LedgerError::PaymentAccountNotFound(id))
    }

    fn lock_payout(&mut self, id: PayoutId) -> Result<PrizePayout> {
        self.lock(RowKey::Payout(id))?;
        self.payout(id).ok_or(LedgerError::PayoutNotFound(id))
    }
}

/// The durable relational store holding every ledger entity.
pub trait LedgerStore: Send + Sync {
    type Tx<'a>: LedgerTx
    where
        Self: 'a;

    /// Open a new atomic unit of work.
    fn begin(&self) -> Self::Tx<'_>;

    fn payment_account(&self, id: PaymentAccountId) -> Option<PaymentAccount>;
    fn payment_accounts_for_user(&self, user: UserId) -> Vec<PaymentAccount>;

    fn transaction(&self, id: TransactionId) -> Option<FinancialTransaction>;
    /// Matching rows in creation order.
    fn transactions(&self, filter: &TransactionFilter) -> Vec<FinancialTransaction>;

    fn escrow(&self, tournament: TournamentId) -> Option<PrizeEscrow>;
    fn escrows(&self) -> Vec<PrizeEscrow>;

    fn prize_pool(&self, id: PrizePoolId) -> Option<PrizePool>;
    fn prize_pool_for_tournament(&self, tournament: TournamentId) -> Option<PrizePool>;

    fn payout(&self, id: PayoutId) -> Option<PrizePayout>;
    fn payouts_for_pool(&self, pool: PrizePoolId) -> Vec<PrizePayout>;
    fn payouts_for_winner(&self, winner: UserId) -> Vec<PrizePayout>;
}
