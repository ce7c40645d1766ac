//! # prizeledger-settlement
//!
//! Money moving *out of* custody, and the read-side checks over it:
//!
//! - [`PrizeDistributionCalculator`]: distribution structure + winners → amounts
//! - [`PrizePayoutExecutor`]: escrow → winner through a processor adapter
//! - [`PrizeDistributor`]: runs a whole breakdown and tracks `PrizePayout` rows
//! - [`RefundProcessor`]: reverses a completed ledger row
//! - [`EscrowConservation`]: released amounts vs settled payout rows
//! - [`FinancialAnalytics`]: aggregates over completed rows, funding gaps,
//!   stale in-flight rows
//!
//! ## Payout flow
//!
//! ```text
//!  reserve (escrow lock)        settle (escrow lock)
//! ┌──────────────────────┐    ┌────────────────────────────────────┐
//! │ status LOCKED?       │    │ re-check status + funds            │
//! │ locked >= amount?    │───▶│ processor.submit_payout(net)       │
//! │ commit PENDING row   │    │ commit COMPLETED + escrow debit    │
//! └──────────────────────┘    │   or FAILED row alone              │
//!                             └────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod conservation;
pub mod distribution;
pub mod distributor;
pub mod payout;
pub mod refund;

pub use analytics::{
    AnalyticsReport, FinancialAnalytics, FundingGap, PlatformSummary, Timeframe, TypeSummary,
};
pub use conservation::{ConservationReport, EscrowConservation};
pub use distribution::{
    BreakdownEntry, DistributionBreakdown, PrizeDistributionCalculator, Winner, calculate,
};
pub use distributor::{DistributionReport, PayoutLine, PrizeDistributor};
pub use payout::{PayoutReceipt, PrizePayoutExecutor};
pub use refund::{RefundProcessor, RefundReceipt};
