//! # prizeledger-store
//!
//! Durable-ledger boundary for the PrizeLedger subsystem.
//!
//! - [`LedgerStore`] / [`LedgerTx`]: the store contract. A unit of work
//!   stages writes, takes row locks, and either commits everything or
//!   nothing. Dropping an uncommitted unit rolls it back.
//! - [`LockManager`]: row-level exclusive locks with a timed wait and a
//!   fixed acquisition order ([`RowKey`] ordering), so two units can
//!   never deadlock.
//! - [`InMemoryLedgerStore`]: the relational tables, secondary indexes
//!   and pre-commit invariant checks, held in process memory.
//!
//! ## Lock order
//!
//! ```text
//! PrizePool < PrizeEscrow < FinancialTransaction < PaymentAccount < PrizePayout
//! ```

pub mod ledger;
pub mod memory;
pub mod row_lock;

pub use ledger::{LedgerStore, LedgerTx, TransactionFilter};
pub use memory::{InMemoryLedgerStore, MemoryTx};
pub use row_lock::{HeldLocks, LockManager, RowKey};
