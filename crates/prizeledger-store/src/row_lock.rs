//! Pessimistic row locks.
//!
//! The in-process equivalent of `SELECT ... FOR UPDATE`: a unit of work
//! takes an exclusive lock on a row key and holds it until commit or
//! rollback. Waiters block on a condition variable and give up after the
//! configured timeout with [`LedgerError::LockTimeout`].
//!
//! Keys are totally ordered by [`RowKey`]'s derived `Ord`. A unit must
//! acquire keys in ascending order; asking for a key below one it already
//! holds fails with [`LedgerError::LockOrderViolation`], so two units can
//! never wait on each other in a cycle.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use prizeledger_types::{
    LedgerError, PaymentAccountId, PayoutId, PrizePoolId, Result, TournamentId, TransactionId,
};

/// A lockable row. Variant order is the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    PrizePool(PrizePoolId),
    /// Escrows are keyed by tournament (unique per tournament), so the lock
    /// also guards creation of a not-yet-existing escrow.
    Escrow(TournamentId),
    Transaction(TransactionId),
    PaymentAccount(PaymentAccountId),
    Payout(PayoutId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrizePool(id) => write!(f, "prize_pool[{id}]"),
            Self::Escrow(id) => write!(f, "prize_escrow[{id}]"),
            Self::Transaction(id) => write!(f, "financial_transaction[{id}]"),
            Self::PaymentAccount(id) => write!(f, "payment_account[{id}]"),
            Self::Payout(id) => write!(f, "prize_payout[{id}]"),
        }
    }
}

/// Process-wide table of held row locks.
pub struct LockManager {
    held: Mutex<HashSet<RowKey>>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until `key` is free (or the timeout passes), then take it.
    pub fn acquire(&self, key: RowKey) -> Result<()> {
        let deadline = Instant::now().checked_add(self.timeout).ok_or_else(|| {
            LedgerError::Configuration(format!("lock timeout {:?} out of range", self.timeout))
        })?;
        let mut held = self.held.lock();
        while held.contains(&key) {
            if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(&key) {
                #[allow(clippy::cast_possible_truncation)]
                let waited_ms = self.timeout.as_millis() as u64;
                tracing::warn!(row = %key, waited_ms, "Row lock wait timed out");
                return Err(LedgerError::LockTimeout {
                    row: key.to_string(),
                    waited_ms,
                });
            }
        }
        held.insert(key);
        Ok(())
    }

    /// Release every key in `keys` and wake all waiters.
    pub fn release_all(&self, keys: &[RowKey]) {
        if keys.is_empty() {
            return;
        }
        {
            let mut held = self.held.lock();
            for key in keys {
                held.remove(key);
            }
        }
        self.released.notify_all();
    }

    #[must_use]
    pub fn is_locked(&self, key: &RowKey) -> bool {
        self.held.lock().contains(key)
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// The locks owned by one unit of work. Released on drop.
pub struct HeldLocks<'m> {
    manager: &'m LockManager,
    keys: Vec<RowKey>,
}

impl<'m> HeldLocks<'m> {
    #[must_use]
    pub fn new(manager: &'m LockManager) -> Self {
        Self {
            manager,
            keys: Vec::new(),
        }
    }

    /// Take `key` in ascending order. Re-locking a held key is a no-op.
    pub fn lock(&mut self, key: RowKey) -> Result<()> {
        if self.keys.contains(&key) {
            return Ok(());
        }
        if let Some(highest) = self.keys.last() {
            if key < *highest {
                return Err(LedgerError::LockOrderViolation {
                    requested: key.to_string(),
                    held: highest.to_string(),
                });
            }
        }
        self.manager.acquire(key)?;
        self.keys.push(key);
        Ok(())
    }

    #[must_use]
    pub fn holds(&self, key: &RowKey) -> bool {
        self.keys.contains(key)
    }

    pub fn release(&mut self) {
        self.manager.release_all(&self.keys);
        self.keys.clear();
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
