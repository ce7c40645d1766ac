//! # prizeledger-types
//!
//! Shared types, errors, and configuration for the **PrizeLedger**
//! tournament prize ledger.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`TournamentId`], [`PrizePoolId`], [`PaymentAccountId`],
//!   [`TransactionId`], [`EscrowId`], [`PayoutId`], [`SponsorId`], [`EscrowAccountId`]
//! - **Money**: [`Currency`], [`money::round_cents`] (2 dp, half-up)
//! - **Entities**: [`PaymentAccount`], [`FinancialTransaction`], [`PrizeEscrow`],
//!   [`PrizePool`], [`PrizePayout`], each with its status machine and
//!   pre-commit invariant checks
//! - **Processor port**: [`ProcessorAdapter`], [`ProcessorRegistry`]
//! - **Configuration**: [`LedgerConfig`], [`EntryFeePolicy`], [`PayoutFeePolicy`]
//! - **Errors**: [`LedgerError`] with `PL_ERR_` prefix codes and [`ErrorKind`]
//! - **Boundary envelope**: [`Response`]

pub mod account;
pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod money;
pub mod payout;
pub mod prize_pool;
pub mod processor;
pub mod response;
pub mod transaction;

// Re-export all primary types at crate root for ergonomic imports:
//   use prizeledger_types::{PrizeEscrow, FinancialTransaction, LedgerError, ...};

pub use account::*;
pub use config::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use money::Currency;
pub use payout::*;
pub use prize_pool::*;
pub use processor::*;
pub use response::*;
pub use transaction::*;

// Constants are accessed via `prizeledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
