//! # prizeledger-custody
//!
//! Money moving *into* custody, and the records that describe where it
//! may later go:
//!
//! - [`PaymentAccountRegistry`]: verified payout destinations per user
//! - [`EscrowManager`]: one locked escrow per tournament, funding, disputes
//! - [`PrizePoolManager`]: distribution configuration and pool lifecycle
//! - [`SponsorshipContributionLedger`]: append-only sponsor pledges
//! - [`EntryFeeProcessor`]: charges entry fees through a processor adapter
//!
//! Every component holds an `Arc` of the same [`LedgerStore`] and performs
//! each mutation inside one of its units of work.
//!
//! [`LedgerStore`]: prizeledger_store::LedgerStore

pub mod accounts;
pub mod entry_fee;
pub mod escrow;
pub mod prize_pool;
pub mod sponsorship;

pub use accounts::{PaymentAccountRegistry, select_payout_account};
pub use entry_fee::{EntryFeeProcessor, EntryFeeReceipt};
pub use escrow::EscrowManager;
pub use prize_pool::PrizePoolManager;
pub use sponsorship::{ContributionReceipt, SponsorshipContributionLedger};
