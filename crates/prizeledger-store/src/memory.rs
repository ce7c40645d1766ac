//! In-memory relational implementation of [`LedgerStore`].
//!
//! Five tables, one per entity, plus the secondary indexes the ledger
//! queries rely on:
//!
//! | Table | Indexes |
//! |-------|---------|
//! | `financial_transaction` | (type, status), from_user, to_user, external id; primary key is time-ordered (UUIDv7) so it doubles as the created-at index |
//! | `prize_escrow` | unique tournament_id (primary key), unique escrow_account_id |
//! | `prize_pool` | unique tournament_id |
//! | `prize_payout` | prize_pool_id, winner_id |
//! | `payment_account` | user_id |
//!
//! Units of work stage writes in a private write set. `commit` takes the
//! table write lock, runs every invariant check against the committed
//! state, and only then applies the whole set, so a failing check leaves
//! the tables untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use parking_lot::RwLock;
use prizeledger_types::{
    EscrowAccountId, FinancialTransaction, LedgerConfig, LedgerError, PaymentAccount,
    PaymentAccountId, PayoutId, PayoutStatus, PrizeEscrow, PrizePayout, PrizePool, PrizePoolId,
    Result, TournamentId, TransactionId, TransactionStatus, TransactionType, UserId,
};

use crate::ledger::{LedgerStore, LedgerTx, TransactionFilter};
use crate::row_lock::{HeldLocks, LockManager, RowKey};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransactionIndexes {
    by_type_status: HashMap<(TransactionType, TransactionStatus), BTreeSet<TransactionId>>,
    by_from_user: HashMap<UserId, BTreeSet<TransactionId>>,
    by_to_user: HashMap<UserId, BTreeSet<TransactionId>>,
    by_external_id: HashMap<String, TransactionId>,
}

impl TransactionIndexes {
    fn insert(&mut self, tx: &FinancialTransaction) {
        self.by_type_status
            .entry((tx.transaction_type(), tx.status))
            .or_default()
            .insert(tx.id);
        if let Some(user) = tx.from_user_id {
            self.by_from_user.entry(user).or_default().insert(tx.id);
        }
        if let Some(user) = tx.to_user_id {
            self.by_to_user.entry(user).or_default().insert(tx.id);
        }
        if let Some(ext) = &tx.external_transaction_id {
            self.by_external_id.insert(ext.clone(), tx.id);
        }
    }

    fn remove(&mut self, tx: &FinancialTransaction) {
        if let Some(ids) = self
            .by_type_status
            .get_mut(&(tx.transaction_type(), tx.status))
        {
            ids.remove(&tx.id);
        }
        if let Some(ext) = &tx.external_transaction_id {
            self.by_external_id.remove(ext);
        }
        // from/to users are immutable on a row; their entries stay valid.
    }

    /// Narrowest candidate set the filter allows, or `None` for a full scan.
    fn candidates(&self, filter: &TransactionFilter) -> Option<BTreeSet<TransactionId>> {
        if let Some(ext) = &filter.external_transaction_id {
            return Some(self.by_external_id.get(ext).copied().into_iter().collect());
        }
        if let Some(user) = filter.from_user {
            return Some(self.by_from_user.get(&user).cloned().unwrap_or_default());
        }
        if let Some(user) = filter.to_user {
            return Some(self.by_to_user.get(&user).cloned().unwrap_or_default());
        }
        if let (Some(kind), false) = (filter.transaction_type, filter.statuses.is_empty()) {
            let mut ids = BTreeSet::new();
            for status in &filter.statuses {
                if let Some(set) = self.by_type_status.get(&(kind, *status)) {
                    ids.extend(set.iter().copied());
                }
            }
            return Some(ids);
        }
        None
    }
}

#[derive(Default)]
struct Tables {
    payment_accounts: BTreeMap<PaymentAccountId, PaymentAccount>,
    accounts_by_user: HashMap<UserId, BTreeSet<PaymentAccountId>>,

    transactions: BTreeMap<TransactionId, FinancialTransaction>,
    transaction_indexes: TransactionIndexes,

    escrows: BTreeMap<TournamentId, PrizeEscrow>,
    escrows_by_account: HashMap<EscrowAccountId, TournamentId>,

    prize_pools: BTreeMap<PrizePoolId, PrizePool>,
    pools_by_tournament: HashMap<TournamentId, PrizePoolId>,

    payouts: BTreeMap<PayoutId, PrizePayout>,
    payouts_by_pool: HashMap<PrizePoolId, BTreeSet<PayoutId>>,
    payouts_by_winner: HashMap<UserId, BTreeSet<PayoutId>>,
}

/// Staged, not yet visible writes of one unit.
#[derive(Default)]
struct WriteSet {
    payment_accounts: BTreeMap<PaymentAccountId, PaymentAccount>,
    transactions: BTreeMap<TransactionId, FinancialTransaction>,
    escrows: BTreeMap<TournamentId, PrizeEscrow>,
    prize_pools: BTreeMap<PrizePoolId, PrizePool>,
    payouts: BTreeMap<PayoutId, PrizePayout>,
}

impl WriteSet {
    fn is_empty(&self) -> bool {
        self.payment_accounts.is_empty()
            && self.transactions.is_empty()
            && self.escrows.is_empty()
            && self.prize_pools.is_empty()
            && self.payouts.is_empty()
    }

    fn row_count(&self) -> usize {
        self.payment_accounts.len()
            + self.transactions.len()
            + self.escrows.len()
            + self.prize_pools.len()
            + self.payouts.len()
    }
}

// ---------------------------------------------------------------------------
// Pre-commit checks
// ---------------------------------------------------------------------------

impl Tables {
    fn check(&self, writes: &WriteSet) -> Result<()> {
        for account in writes.payment_accounts.values() {
            if let Some(committed) = self.payment_accounts.get(&account.id) {
                if committed.user_id != account.user_id
                    || committed.payment_method != account.payment_method
                {
                    return Err(LedgerError::InvariantViolation {
                        reason: format!("payment account {}: owner or method changed", account.id),
                    });
                }
            }
        }

        for tx in writes.transactions.values() {
            tx.check_invariants()?;
            if let Some(committed) = self.transactions.get(&tx.id) {
                tx.check_update_from(committed)?;
            }
            if let Some(ext) = &tx.external_transaction_id {
                if let Some(owner) = self.transaction_indexes.by_external_id.get(ext) {
                    if *owner != tx.id {
                        return Err(LedgerError::InvariantViolation {
                            reason: format!("external transaction id {ext} already recorded"),
                        });
                    }
                }
            }
        }

        for escrow in writes.escrows.values() {
            escrow.check_invariants()?;
            match self.escrows.get(&escrow.tournament_id) {
                Some(committed) if committed.id != escrow.id => {
                    return Err(LedgerError::EscrowAlreadyExists(escrow.tournament_id));
                }
                Some(committed) => escrow.check_update_from(committed)?,
                None => {
                    if self
                        .escrows_by_account
                        .contains_key(&escrow.escrow_account_id)
                    {
                        return Err(LedgerError::InvariantViolation {
                            reason: format!(
                                "escrow account {} already in use",
                                escrow.escrow_account_id
                            ),
                        });
                    }
                }
            }
        }

        for pool in writes.prize_pools.values() {
            pool.check_invariants()?;
            match self.pools_by_tournament.get(&pool.tournament_id) {
                Some(existing) if *existing != pool.id => {
                    return Err(LedgerError::PrizePoolAlreadyExists(pool.tournament_id));
                }
                _ => {}
            }
            if let Some(committed) = self.prize_pools.get(&pool.id) {
                pool.check_update_from(committed)?;
            }
        }

        for payout in writes.payouts.values() {
            if let Some(committed) = self.payouts.get(&payout.id) {
                if payout.status != committed.status
                    && !committed.status.can_transition_to(payout.status)
                {
                    return Err(LedgerError::InvalidPayoutTransition {
                        id: payout.id,
                        from: committed.status,
                        to: payout.status,
                    });
                }
            }
            if payout.status == PayoutStatus::Completed {
                self.check_completed_payout(payout, writes)?;
            }
        }
        Ok(())
    }

    /// A COMPLETED payout must point at a COMPLETED PRIZE_PAYOUT row of
    /// the same amount.
    fn check_completed_payout(&self, payout: &PrizePayout, writes: &WriteSet) -> Result<()> {
        let violation = |reason: &str| LedgerError::InvariantViolation {
            reason: format!("payout {}: {reason}", payout.id),
        };
        let tx_id = payout
            .transaction_id
            .ok_or_else(|| violation("completed without a ledger row"))?;
        let tx = writes
            .transactions
            .get(&tx_id)
            .or_else(|| self.transactions.get(&tx_id))
            .ok_or_else(|| violation("references a missing ledger row"))?;
        if tx.transaction_type() != TransactionType::PrizePayout
            || tx.status != TransactionStatus::Completed
        {
            return Err(violation("ledger row is not a completed prize payout"));
        }
        if tx.amount != payout.amount {
            return Err(violation("ledger row amount differs from payout amount"));
        }
        Ok(())
    }

    fn apply(&mut self, writes: WriteSet) {
        for (id, account) in writes.payment_accounts {
            self.accounts_by_user
                .entry(account.user_id)
                .or_default()
                .insert(id);
            self.payment_accounts.insert(id, account);
        }

        for (id, tx) in writes.transactions {
            if let Some(old) = self.transactions.get(&id) {
                self.transaction_indexes.remove(old);
            }
            self.transaction_indexes.insert(&tx);
            self.transactions.insert(id, tx);
        }

        for (tournament, escrow) in writes.escrows {
            self.escrows_by_account
                .insert(escrow.escrow_account_id.clone(), tournament);
            self.escrows.insert(tournament, escrow);
        }

        for (id, pool) in writes.prize_pools {
            self.pools_by_tournament.insert(pool.tournament_id, id);
            self.prize_pools.insert(id, pool);
        }

        for (id, payout) in writes.payouts {
            self.payouts_by_pool
                .entry(payout.prize_pool_id)
                .or_default()
                .insert(id);
            self.payouts_by_winner
                .entry(payout.winner_id)
                .or_default()
                .insert(id);
            self.payouts.insert(id, payout);
        }
    }

    fn accounts_for_user(&self, user: UserId) -> impl Iterator<Item = &PaymentAccount> {
        self.accounts_by_user
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|id| self.payment_accounts.get(id))
    }

    fn pool_for_tournament(&self, tournament: TournamentId) -> Option<&PrizePool> {
        self.pools_by_tournament
            .get(&tournament)
            .and_then(|id| self.prize_pools.get(id))
    }

    fn payouts_in(&self, ids: Option<&BTreeSet<PayoutId>>) -> Vec<PrizePayout> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.payouts.get(id).cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// InMemoryLedgerStore
// ---------------------------------------------------------------------------

/// Thread-safe in-memory ledger store.
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    locks: LockManager,
}

impl InMemoryLedgerStore {
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: LockManager::new(lock_timeout),
        }
    }

    #[must_use]
    pub fn with_config(config: &LedgerConfig) -> Self {
        Self::new(config.lock_timeout())
    }

    /// Row locks currently held by open units of work.
    #[must_use]
    pub fn held_lock_count(&self) -> usize {
        self.locks.held_count()
    }

    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.tables.read().transactions.len()
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::with_config(&LedgerConfig::default())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> MemoryTx<'_> {
        MemoryTx {
            store: self,
            locks: HeldLocks::new(&self.locks),
            writes: WriteSet::default(),
        }
    }

    fn payment_account(&self, id: PaymentAccountId) -> Option<PaymentAccount> {
        self.tables.read().payment_accounts.get(&id).cloned()
    }

    fn payment_accounts_for_user(&self, user: UserId) -> Vec<PaymentAccount> {
        self.tables
            .read()
            .accounts_for_user(user)
            .cloned()
            .collect()
    }

    fn transaction(&self, id: TransactionId) -> Option<FinancialTransaction> {
        self.tables.read().transactions.get(&id).cloned()
    }

    fn transactions(&self, filter: &TransactionFilter) -> Vec<FinancialTransaction> {
        let tables = self.tables.read();
        match tables.transaction_indexes.candidates(filter) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| tables.transactions.get(id))
                .filter(|tx| filter.matches(tx))
                .cloned()
                .collect(),
            None => tables
                .transactions
                .values()
                .filter(|tx| filter.matches(tx))
                .cloned()
                .collect(),
        }
    }

    fn escrow(&self, tournament: TournamentId) -> Option<PrizeEscrow> {
        self.tables.read().escrows.get(&tournament).cloned()
    }

    fn escrows(&self) -> Vec<PrizeEscrow> {
        self.tables.read().escrows.values().cloned().collect()
    }

    fn prize_pool(&self, id: PrizePoolId) -> Option<PrizePool> {
        self.tables.read().prize_pools.get(&id).cloned()
    }

    fn prize_pool_for_tournament(&self, tournament: TournamentId) -> Option<PrizePool> {
        self.tables.read().pool_for_tournament(tournament).cloned()
    }

    fn payout(&self, id: PayoutId) -> Option<PrizePayout> {
        self.tables.read().payouts.get(&id).cloned()
    }

    fn payouts_for_pool(&self, pool: PrizePoolId) -> Vec<PrizePayout> {
        let tables = self.tables.read();
        tables.payouts_in(tables.payouts_by_pool.get(&pool))
    }

    fn payouts_for_winner(&self, winner: UserId) -> Vec<PrizePayout> {
        let tables = self.tables.read();
        tables.payouts_in(tables.payouts_by_winner.get(&winner))
    }
}

// ---------------------------------------------------------------------------
// MemoryTx
// ---------------------------------------------------------------------------

/// A unit of work against [`InMemoryLedgerStore`].
pub struct MemoryTx<'s> {
    store: &'s InMemoryLedgerStore,
    locks: HeldLocks<'s>,
    writes: WriteSet,
}

impl LedgerTx for MemoryTx<'_> {
    fn lock(&mut self, key: RowKey) -> Result<()> {
        self.locks.lock(key)
    }

    fn payment_account(&self, id: PaymentAccountId) -> Option<PaymentAccount> {
        self.writes
            .payment_accounts
            .get(&id)
            .cloned()
            .or_else(|| self.store.payment_account(id))
    }

    fn payment_accounts_for_user(&self, user: UserId) -> Vec<PaymentAccount> {
        let mut accounts: BTreeMap<PaymentAccountId, PaymentAccount> = self
            .store
            .payment_accounts_for_user(user)
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        for staged in self.writes.payment_accounts.values() {
            if staged.user_id == user {
                accounts.insert(staged.id, staged.clone());
            }
        }
        accounts.into_values().collect()
    }

    fn put_payment_account(&mut self, account: PaymentAccount) {
        tracing::debug!(account = %account.id, "Staged payment account write");
        self.writes.payment_accounts.insert(account.id, account);
    }

    fn transaction(&self, id: TransactionId) -> Option<FinancialTransaction> {
        self.writes
            .transactions
            .get(&id)
            .cloned()
            .or_else(|| self.store.transaction(id))
    }

    fn put_transaction(&mut self, tx: FinancialTransaction) {
        tracing::debug!(transaction = %tx.id, status = %tx.status, "Staged ledger row write");
        self.writes.transactions.insert(tx.id, tx);
    }

    fn escrow(&self, tournament: TournamentId) -> Option<PrizeEscrow> {
        self.writes
            .escrows
            .get(&tournament)
            .cloned()
            .or_else(|| self.store.escrow(tournament))
    }

    fn put_escrow(&mut self, escrow: PrizeEscrow) {
        tracing::debug!(tournament = %escrow.tournament_id, locked = %escrow.locked_amount, "Staged escrow write");
        self.writes.escrows.insert(escrow.tournament_id, escrow);
    }

    fn prize_pool(&self, id: PrizePoolId) -> Option<PrizePool> {
        self.writes
            .prize_pools
            .get(&id)
            .cloned()
            .or_else(|| self.store.prize_pool(id))
    }

    fn prize_pool_for_tournament(&self, tournament: TournamentId) -> Option<PrizePool> {
        self.writes
            .prize_pools
            .values()
            .find(|p| p.tournament_id == tournament)
            .cloned()
            .or_else(|| self.store.prize_pool_for_tournament(tournament))
    }

    fn put_prize_pool(&mut self, pool: PrizePool) {
        tracing::debug!(pool = %pool.id, total = %pool.total_prize_amount, "Staged prize pool write");
        self.writes.prize_pools.insert(pool.id, pool);
    }

    fn payout(&self, id: PayoutId) -> Option<PrizePayout> {
        self.writes
            .payouts
            .get(&id)
            .cloned()
            .or_else(|| self.store.payout(id))
    }

    fn put_payout(&mut self, payout: PrizePayout) {
        tracing::debug!(payout = %payout.id, status = %payout.status, "Staged payout write");
        self.writes.payouts.insert(payout.id, payout);
    }

    fn commit(mut self) -> Result<()> {
        let writes = std::mem::take(&mut self.writes);
        if writes.is_empty() {
            return Ok(());
        }
        let rows = writes.row_count();
        {
            let mut tables = self.store.tables.write();
            if let Err(err) = tables.check(&writes) {
                tracing::warn!(error = %err, rows, "Commit rejected by invariant check");
                return Err(err);
            }
            tables.apply(writes);
        }
        tracing::debug!(rows, "Unit of work committed");
        // Row locks are released when `self.locks` drops, after the apply.
        Ok(())
    }
}
